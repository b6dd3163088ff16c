//! Tests for the IRC integrator

use super::*;
use crate::error::{IrcError, IrcResult};
use crate::provider::CoordinateProvider;
use nalgebra::{DMatrix, DVector};

/// Single atom on V = -a x^2/2 + c x^4/4 + b (y^2 + z^2)/2.
/// The TS sits at the origin, the minima at x = +-sqrt(a/c).
struct QuarticWell {
    atoms: Vec<String>,
    masses: Vec<f64>,
    a: f64,
    b: f64,
    c: f64,
    energy_calls: usize,
    fail_at_energy_call: Option<usize>,
}

impl QuarticWell {
    fn new(a: f64, c: f64) -> Self {
        QuarticWell {
            atoms: vec!["H".to_string()],
            masses: vec![1.0],
            a,
            b: 1.0,
            c,
            energy_calls: 0,
            fail_at_energy_call: None,
        }
    }

    fn with_mass(mut self, mass: f64) -> Self {
        self.masses = vec![mass];
        self
    }
}

impl CoordinateProvider for QuarticWell {
    fn atoms(&self) -> &[String] {
        &self.atoms
    }

    fn masses(&self) -> &[f64] {
        &self.masses
    }

    fn energy(&mut self, coords: &DVector<f64>) -> IrcResult<f64> {
        self.energy_calls += 1;
        if Some(self.energy_calls) == self.fail_at_energy_call {
            return Err(IrcError::Provider("SCF did not converge".to_string()));
        }
        let (x, y, z) = (coords[0], coords[1], coords[2]);
        Ok(-self.a * x * x / 2.0 + self.c * x.powi(4) / 4.0 + self.b * (y * y + z * z) / 2.0)
    }

    fn gradient(&mut self, coords: &DVector<f64>) -> IrcResult<DVector<f64>> {
        let (x, y, z) = (coords[0], coords[1], coords[2]);
        Ok(DVector::from_vec(vec![
            -self.a * x + self.c * x.powi(3),
            self.b * y,
            self.b * z,
        ]))
    }

    fn hessian(&mut self, coords: &DVector<f64>) -> IrcResult<DMatrix<f64>> {
        let x = coords[0];
        Ok(DMatrix::from_diagonal(&DVector::from_vec(vec![
            -self.a + 3.0 * self.c * x * x,
            self.b,
            self.b,
        ])))
    }
}

/// H-C-N with C at the origin and N on the x axis. Only the y coordinate of
/// H feels a double well, centred on the bent TS at y = 0.6 with minima at
/// y = 0 (linear) and y = 1.2. All other coordinates are held by springs.
struct BendingTriatomic {
    atoms: Vec<String>,
    masses: Vec<f64>,
    ts: DVector<f64>,
    a: f64,
    c: f64,
}

impl BendingTriatomic {
    const ACTIVE: usize = 1;

    fn new() -> Self {
        BendingTriatomic {
            atoms: vec!["H".to_string(), "C".to_string(), "N".to_string()],
            masses: vec![1.0, 12.0, 14.0],
            ts: DVector::from_vec(vec![-2.0, 0.6, 0.0, 0.0, 0.0, 0.0, 2.2, 0.0, 0.0]),
            a: 1.0,
            c: 1.0 / 0.36,
        }
    }

    fn hydrogen_y(coords: &DVector<f64>) -> f64 {
        coords[Self::ACTIVE]
    }
}

impl CoordinateProvider for BendingTriatomic {
    fn atoms(&self) -> &[String] {
        &self.atoms
    }

    fn masses(&self) -> &[f64] {
        &self.masses
    }

    fn energy(&mut self, coords: &DVector<f64>) -> IrcResult<f64> {
        let d = coords - &self.ts;
        let y = d[Self::ACTIVE];
        let springs = d.norm_squared() - y * y;
        Ok(-self.a * y * y / 2.0 + self.c * y.powi(4) / 4.0 + springs / 2.0)
    }

    fn gradient(&mut self, coords: &DVector<f64>) -> IrcResult<DVector<f64>> {
        let mut gradient = coords - &self.ts;
        let y = gradient[Self::ACTIVE];
        gradient[Self::ACTIVE] = -self.a * y + self.c * y.powi(3);
        Ok(gradient)
    }

    fn hessian(&mut self, coords: &DVector<f64>) -> IrcResult<DMatrix<f64>> {
        let y = coords[Self::ACTIVE] - self.ts[Self::ACTIVE];
        let mut hessian = DMatrix::identity(9, 9);
        hessian[(Self::ACTIVE, Self::ACTIVE)] = -self.a + 3.0 * self.c * y * y;
        Ok(hessian)
    }
}

/// Direction whose first step moves H towards the C-N line.
fn towards_linear<P: CoordinateProvider>(irc: &Irc<P>) -> (Direction, Direction) {
    if irc.initial_displacement().displacement[BendingTriatomic::ACTIVE] < 0.0 {
        (Direction::Forward, Direction::Backward)
    } else {
        (Direction::Backward, Direction::Forward)
    }
}

fn origin() -> DVector<f64> {
    DVector::zeros(3)
}

fn config(max_steps: usize) -> IrcConfig {
    IrcConfig {
        max_steps,
        ..IrcConfig::default()
    }
}

#[test]
fn test_initial_step_length_from_curvature() {
    let irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(10)).unwrap();
    let init = irc.initial_displacement();
    assert!((init.eigenvalue + 1.0).abs() < 1e-12);
    assert!((init.step_length - 5e-4_f64.sqrt()).abs() < 1e-12);
    assert!((init.transition_vector[0].abs() - 1.0).abs() < 1e-12);
    assert!((init.displacement.norm() - init.step_length).abs() < 1e-12);
    assert!(init.degeneracy.is_none());
}

#[test]
fn test_initial_step_uses_mass_weighted_curvature() {
    let provider = QuarticWell::new(1.0, 1.0).with_mass(4.0);
    let irc = Irc::new(provider, origin(), config(10)).unwrap();
    let init = irc.initial_displacement();
    assert!((init.eigenvalue + 0.25).abs() < 1e-12);
    assert!((init.step_length - 2e-3_f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_degenerate_modes_are_reported() {
    let mw_hessian = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, -0.8, 1.0]));
    let init = initial_displacement(&mw_hessian, &DMatrix::identity(3, 3), 2.5e-4, 0.5).unwrap();
    let warning = init.degeneracy.expect("expected a degeneracy warning");
    assert!((warning.selected.1 + 1.0).abs() < 1e-12);
    assert_eq!(warning.competing.len(), 1);
    assert!((warning.competing[0].1 + 0.8).abs() < 1e-12);

    let strict = initial_displacement(&mw_hessian, &DMatrix::identity(3, 3), 2.5e-4, 0.9).unwrap();
    assert!(strict.degeneracy.is_none());
}

#[test]
fn test_flat_transition_mode_is_rejected() {
    let result = Irc::new(QuarticWell::new(0.0, 1.0), origin(), config(10));
    assert!(matches!(result, Err(IrcError::FlatTransitionMode(_))));
}

#[test]
fn test_walk_stops_when_energy_increases() {
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(50)).unwrap();
    let walk = irc.walk(Direction::Forward);
    assert_eq!(walk.termination, Termination::EnergyIncreased);
    assert_eq!(walk.steps(), 11);
    assert_eq!(walk.energies.len(), 11);
    assert!(walk.energies[10] > walk.energies[9]);
    for pair in walk.energies[..10].windows(2) {
        assert!(pair[1] < pair[0]);
    }
    // the walk overshoots the minimum at |x| = 1 by less than one step
    let last_x = walk.coords[10][0].abs();
    assert!(last_x > 1.0 && last_x < 1.1);
}

#[test]
fn test_walk_converges_on_shallow_well() {
    let mut irc = Irc::new(QuarticWell::new(1e-3, 1e-3), origin(), config(50)).unwrap();
    let walk = irc.walk(Direction::Backward);
    assert_eq!(walk.termination, Termination::EnergyConverged);
    assert_eq!(walk.steps(), 3);
    let last = walk.energies[2];
    assert!((last - walk.energies[1]).abs() <= 1e-5);
}

#[test]
fn test_walk_respects_max_steps() {
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(3)).unwrap();
    let walk = irc.walk(Direction::Forward);
    assert_eq!(walk.termination, Termination::StepsExceeded);
    assert_eq!(walk.steps(), 3);
    assert_eq!(walk.energies.len(), 3);
}

#[test]
fn test_forward_and_backward_mirror_each_other() {
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(50)).unwrap();
    let forward = irc.walk(Direction::Forward);
    let backward = irc.walk(Direction::Backward);
    assert_eq!(forward.steps(), backward.steps());
    for (f, b) in forward.coords.iter().zip(&backward.coords) {
        assert!((f + b).norm() < 1e-10);
    }
    for (ef, eb) in forward.energies.iter().zip(&backward.energies) {
        assert!((ef - eb).abs() < 1e-12);
    }
}

#[test]
fn test_path_assembly_places_ts_between_walks() {
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(4)).unwrap();
    let run = irc.run();
    let forward = run.forward.as_ref().unwrap();
    let backward = run.backward.as_ref().unwrap();
    let path = &run.path;

    assert_eq!(path.len(), forward.steps() + 1 + backward.steps());
    assert_eq!(path.ts_index, forward.steps());
    assert_eq!(path.coords[path.ts_index], origin());
    assert_eq!(path.energies[path.ts_index], irc.ts_energy());
    assert_eq!(&path.coords[0], forward.coords.last().unwrap());
    assert_eq!(path.energies[0], *forward.energies.last().unwrap());
    assert_eq!(path.coords.last(), backward.coords.last());
}

#[test]
fn test_single_direction_path() {
    let cfg = IrcConfig {
        forward: false,
        ..config(4)
    };
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), cfg).unwrap();
    let run = irc.run();
    assert!(run.forward.is_none());
    assert_eq!(run.path.ts_index, 0);
    assert_eq!(run.path.len(), 1 + run.backward.unwrap().steps());
}

#[test]
fn test_walks_do_not_share_hessian_state() {
    let cfg = IrcConfig {
        stepper: StepperKind::HessianPredictor,
        hessian_update: crate::hessian_update::HessianUpdate::Bofill,
        ..config(20)
    };
    let mut both = Irc::new(QuarticWell::new(1.0, 1.0), origin(), cfg.clone()).unwrap();
    both.walk(Direction::Forward);
    let after_forward = both.walk(Direction::Backward);

    let mut fresh = Irc::new(QuarticWell::new(1.0, 1.0), origin(), cfg).unwrap();
    let alone = fresh.walk(Direction::Backward);

    assert_eq!(after_forward.termination, alone.termination);
    assert_eq!(after_forward.coords, alone.coords);
    assert_eq!(after_forward.energies, alone.energies);
}

#[test]
fn test_hessian_recalc_runs_with_predictor() {
    let cfg = IrcConfig {
        stepper: StepperKind::HessianPredictor,
        hessian_recalc: Some(2),
        ..config(50)
    };
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), cfg).unwrap();
    let walk = irc.walk(Direction::Forward);
    assert!(!matches!(walk.termination, Termination::Aborted(_)));
    // the well bottom is at -0.25
    let lowest = walk.energies.iter().copied().fold(f64::INFINITY, f64::min);
    assert!(lowest < -0.24, "lowest energy {}", lowest);
}

#[test]
fn test_provider_failure_aborts_walk() {
    let mut provider = QuarticWell::new(1.0, 1.0);
    // call 1 is the TS energy, call 3 the energy after the second step
    provider.fail_at_energy_call = Some(3);
    let mut irc = Irc::new(provider, origin(), config(10)).unwrap();
    let walk = irc.walk(Direction::Forward);
    assert!(matches!(walk.termination, Termination::Aborted(IrcError::Provider(_))));
    assert_eq!(walk.energies.len(), 1);
    assert_eq!(walk.coords.len(), 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let cfg = IrcConfig {
        step_length: 0.0,
        ..IrcConfig::default()
    };
    assert!(matches!(
        Irc::new(QuarticWell::new(1.0, 1.0), origin(), cfg),
        Err(IrcError::Configuration(_))
    ));

    let no_direction = IrcConfig {
        forward: false,
        backward: false,
        ..IrcConfig::default()
    };
    assert!(no_direction.validate().is_err());

    let recalc_zero = IrcConfig {
        hessian_recalc: Some(0),
        ..IrcConfig::default()
    };
    assert!(recalc_zero.validate().is_err());

    let bad_ratio = IrcConfig {
        degenerate_mode_ratio: 1.5,
        ..IrcConfig::default()
    };
    assert!(bad_ratio.validate().is_err());
    assert!(IrcConfig::default().validate().is_ok());
}

#[test]
fn test_ts_coordinate_length_is_checked() {
    let result = Irc::new(QuarticWell::new(1.0, 1.0), DVector::zeros(6), config(10));
    assert!(matches!(
        result,
        Err(IrcError::DimensionMismatch { expected: 3, actual: 6, .. })
    ));
}

#[test]
fn test_mass_sqrt_inverse_default() {
    let provider = QuarticWell::new(1.0, 1.0).with_mass(4.0);
    let m = provider.mass_sqrt_inverse();
    assert_eq!(m, DMatrix::from_diagonal_element(3, 3, 0.5));
}

#[test]
fn test_euler_step_follows_mass_weighted_gradient() {
    let gradient = DVector::from_vec(vec![0.3, -0.4, 0.0, 0.0, 0.0, 0.1]);
    let masses = DVector::from_vec(vec![1.0, 1.0, 1.0, 4.0, 4.0, 4.0]);
    let mass_sqrt_inv = DMatrix::from_diagonal(&masses.map(|m: f64| 1.0 / m.sqrt()));
    let hessian = DMatrix::identity(6, 6);
    let ctx = StepContext {
        coords: &DVector::zeros(6),
        gradient: &gradient,
        hessian: &hessian,
        mass_sqrt_inv: &mass_sqrt_inv,
        step_length: 0.2,
    };
    let step = EulerStepper.step(&ctx).unwrap();
    assert!((step.norm() - 0.2).abs() < 1e-12);
    // heavy atoms move less: the last component is scaled by 1/4
    let unscaled = DVector::from_vec(vec![-0.3, 0.4, 0.0, 0.0, 0.0, -0.025]);
    assert!((step - unscaled.normalize() * 0.2).norm() < 1e-12);
}

#[test]
fn test_stationary_gradient_has_no_direction() {
    let zeros = DVector::zeros(3);
    let identity = DMatrix::identity(3, 3);
    let ctx = StepContext {
        coords: &zeros,
        gradient: &zeros,
        hessian: &identity,
        mass_sqrt_inv: &identity,
        step_length: 0.1,
    };
    assert!(matches!(
        create_stepper(StepperKind::Euler).step(&ctx),
        Err(IrcError::StationaryPoint { .. })
    ));
}

#[test]
fn test_predictor_matches_euler_without_curvature() {
    let gradient = DVector::from_vec(vec![0.1, 0.2, -0.3]);
    let zero_hessian = DMatrix::zeros(3, 3);
    let identity = DMatrix::identity(3, 3);
    let ctx = StepContext {
        coords: &gradient,
        gradient: &gradient,
        hessian: &zero_hessian,
        mass_sqrt_inv: &identity,
        step_length: 0.1,
    };
    let euler = EulerStepper.step(&ctx).unwrap();
    let predictor = HessianPredictorStepper.step(&ctx).unwrap();
    assert!((euler - predictor).norm() < 1e-14);
}

#[test]
fn test_stepper_kind_from_str() {
    assert_eq!("euler".parse::<StepperKind>().unwrap(), StepperKind::Euler);
    assert_eq!("HP".parse::<StepperKind>().unwrap(), StepperKind::HessianPredictor);
    assert!("rk4".parse::<StepperKind>().is_err());
}

#[test]
fn test_walk_through_linear_bend_rebuilds_internals() {
    let provider = BendingTriatomic::new();
    let ts = provider.ts.clone();
    let mut irc = Irc::new(provider, ts, config(20)).unwrap();
    let (linear, bent) = towards_linear(&irc);

    let walk = irc.walk(linear);
    // the H-C-N bend passes 175 degrees after five steps and is replaced by
    // a linear bend pair; the walk then runs on to the well bottom
    assert_eq!(walk.termination, Termination::EnergyIncreased);
    assert_eq!(walk.internal_rebuilds, 1);
    assert_eq!(walk.steps(), 7);
    let last_y = BendingTriatomic::hydrogen_y(walk.coords.last().unwrap());
    assert!(last_y.abs() < 0.05, "H ended at y = {}", last_y);

    assert_eq!(walk.internal_gradient_rms.len(), walk.steps());
    assert!(walk.internal_gradient_rms.iter().all(|&rms| rms > 0.0));

    let other = irc.walk(bent);
    assert_eq!(other.internal_rebuilds, 0);
    assert!(!matches!(other.termination, Termination::Aborted(_)));
}

#[test]
fn test_underdetermined_internals_abort_and_keep_partial_walk() {
    let provider = BendingTriatomic::new();
    let ts = provider.ts.clone();
    let mut cfg = config(20);
    // the TS bend (163 deg) passes, but the bend drops out below 155 deg
    cfg.thresholds.bend_min_deg = 155.0;
    let mut irc = Irc::new(provider, ts, cfg).unwrap();
    let (_, bent) = towards_linear(&irc);

    let walk = irc.walk(bent);
    assert_eq!(
        walk.termination,
        Termination::Aborted(IrcError::Coordinates(
            intcoords::IntCoordError::Underdetermined { rank: 2, required: 3 }
        ))
    );
    assert_eq!(walk.steps(), 4);
    assert_eq!(walk.energies.len(), 4);
    assert_eq!(walk.internal_gradient_rms.len(), 4);
    for pair in walk.energies.windows(2) {
        assert!(pair[1] < pair[0]);
    }
}

#[test]
fn test_single_atom_has_no_internal_gradient() {
    let mut irc = Irc::new(QuarticWell::new(1.0, 1.0), origin(), config(3)).unwrap();
    let walk = irc.walk(Direction::Forward);
    assert_eq!(walk.internal_gradient_rms, vec![0.0; 3]);
}

#[test]
fn test_negative_count_ignores_numerical_zeros() {
    let modes = NormalModes {
        eigenvalues: DVector::from_vec(vec![-0.02, -3e-11, 0.0, 4e-12, 0.5]),
        eigenvectors: DMatrix::identity(5, 5),
    };
    assert_eq!(modes.negative_count(), 1);
}
