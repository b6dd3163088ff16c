use super::{
    create_stepper, DegenerateModeWarning, Direction, DirectionalWalk, InitialDisplacement,
    IrcConfig, IrcPath, IrcRun, NormalModes, PathStepper, StepContext, Termination,
};
use crate::error::{IrcError, IrcResult};
use crate::provider::CoordinateProvider;
use intcoords::{to_coords3d, RedundantCoords};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::{debug, info, warn};

/// Eigenvalues closer to zero than this leave the initial step undefined.
const FLAT_MODE_EPS: f64 = 1e-12;

/// Integrator bound to one provider and one transition state.
pub struct Irc<P: CoordinateProvider> {
    provider: P,
    config: IrcConfig,
    stepper: Box<dyn PathStepper>,
    ts_coords: DVector<f64>,
    ts_energy: f64,
    ts_hessian: DMatrix<f64>,
    mass_sqrt_inv: DMatrix<f64>,
    internals: RedundantCoords,
    init: InitialDisplacement,
}

/// Mutable state of one directional walk.
struct WalkState {
    current: DVector<f64>,
    hessian: DMatrix<f64>,
    internals: RedundantCoords,
    coords: Vec<DVector<f64>>,
    energies: Vec<f64>,
    internal_gradient_rms: Vec<f64>,
    rebuilds: usize,
}

impl<P: CoordinateProvider> Irc<P> {
    /// Freeze the TS data and derive the initial displacement. Nothing is
    /// walked yet.
    pub fn new(mut provider: P, ts_coords: DVector<f64>, config: IrcConfig) -> IrcResult<Self> {
        config.validate()?;

        let natoms = provider.atoms().len();
        if provider.masses().len() != natoms {
            return Err(IrcError::DimensionMismatch {
                context: "masses",
                expected: natoms,
                actual: provider.masses().len(),
            });
        }
        if ts_coords.len() != 3 * natoms {
            return Err(IrcError::DimensionMismatch {
                context: "TS coordinates",
                expected: 3 * natoms,
                actual: ts_coords.len(),
            });
        }

        let ts_energy = provider.energy(&ts_coords)?;
        let ts_hessian = provider.hessian(&ts_coords)?;
        let mass_sqrt_inv = provider.mass_sqrt_inverse();
        let mw_hessian = &mass_sqrt_inv * &ts_hessian * &mass_sqrt_inv;

        let internals = RedundantCoords::with_define_prims(
            provider.atoms().to_vec(),
            to_coords3d(&ts_coords),
            config.thresholds,
            config.define_prims.clone(),
        )?;
        info!(
            "Internal coordinates at the TS: {} primitives",
            internals.typed_prims().len()
        );

        let init = initial_displacement(
            &mw_hessian,
            &mass_sqrt_inv,
            config.energy_lowering,
            config.degenerate_mode_ratio,
        )?;
        let stepper = create_stepper(config.stepper);

        Ok(Irc {
            provider,
            config,
            stepper,
            ts_coords,
            ts_energy,
            ts_hessian,
            mass_sqrt_inv,
            internals,
            init,
        })
    }

    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    pub fn initial_displacement(&self) -> &InitialDisplacement {
        &self.init
    }

    pub fn ts_coords(&self) -> &DVector<f64> {
        &self.ts_coords
    }

    pub fn ts_energy(&self) -> f64 {
        self.ts_energy
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Walk both enabled directions and stitch the path together.
    pub fn run(&mut self) -> IrcRun {
        let forward = if self.config.forward {
            Some(self.walk(Direction::Forward))
        } else {
            None
        };
        let backward = if self.config.backward {
            Some(self.walk(Direction::Backward))
        } else {
            None
        };
        let path = IrcPath::assemble(
            forward.as_ref(),
            &self.ts_coords,
            self.ts_energy,
            backward.as_ref(),
        );
        IrcRun {
            forward,
            backward,
            path,
        }
    }

    /// Walk downhill from the TS in one direction. Errors never escape: they
    /// end the walk with [`Termination::Aborted`] and the points gathered so
    /// far.
    pub fn walk(&mut self, direction: Direction) -> DirectionalWalk {
        info!("##############################");
        info!("IRC - {}", direction);
        info!("##############################");

        let current = &self.ts_coords + &self.init.displacement * direction.sign();
        info!("Did initial step of {:.4} from the TS.", self.init.step_length);

        let mut state = WalkState {
            current,
            hessian: self.ts_hessian.clone(),
            internals: self.internals.clone(),
            coords: Vec::new(),
            energies: Vec::new(),
            internal_gradient_rms: Vec::new(),
            rebuilds: 0,
        };

        let termination = match self.advance(&mut state) {
            Ok(termination) => termination,
            Err(err) => {
                warn!("IRC {} walk aborted: {}", direction, err);
                Termination::Aborted(err)
            }
        };
        state.coords.truncate(state.energies.len());
        state.internal_gradient_rms.truncate(state.coords.len());
        info!(
            "IRC {} finished after {} steps: {}",
            direction,
            state.coords.len(),
            termination
        );

        DirectionalWalk {
            direction,
            coords: state.coords,
            energies: state.energies,
            termination,
            internal_gradient_rms: state.internal_gradient_rms,
            internal_rebuilds: state.rebuilds,
        }
    }

    fn advance(&mut self, state: &mut WalkState) -> IrcResult<Termination> {
        let mut gradient = self.provider.gradient(&state.current)?;
        refresh_internals(state, &gradient)?;

        let max_steps = self.config.max_steps;
        let mut prev_energy = self.ts_energy;
        let mut cur_step = 0;
        loop {
            if cur_step == max_steps {
                info!("IRC steps exceeded. Stopping.");
                return Ok(Termination::StepsExceeded);
            }
            info!("IRC step {} out of {}", cur_step + 1, max_steps);
            state.coords.push(state.current.clone());

            let ctx = StepContext {
                coords: &state.current,
                gradient: &gradient,
                hessian: &state.hessian,
                mass_sqrt_inv: &self.mass_sqrt_inv,
                step_length: self.config.step_length,
            };
            let step = self.stepper.step(&ctx)?;
            let new_coords = &state.current + &step;
            let energy = self.provider.energy(&new_coords)?;
            let new_gradient = self.provider.gradient(&new_coords)?;
            state.energies.push(energy);
            debug!(
                "{} step: E = {:.10}, dE = {:+.3e}, |g| = {:.3e}",
                self.stepper.name(),
                energy,
                energy - prev_energy,
                new_gradient.norm()
            );

            state.hessian = match self.config.hessian_recalc {
                Some(every) if (cur_step + 1) % every == 0 => {
                    debug!("Recalculating the Hessian");
                    self.provider.hessian(&new_coords)?
                }
                _ => self.config.hessian_update.apply(
                    &state.hessian,
                    &step,
                    &(&new_gradient - &gradient),
                ),
            };
            state.current = new_coords;
            gradient = new_gradient;

            if energy > prev_energy {
                info!("Energy increased!");
                return Ok(Termination::EnergyIncreased);
            }
            if (energy - prev_energy).abs() <= self.config.energy_thresh {
                info!("Energy converged!");
                return Ok(Termination::EnergyConverged);
            }
            prev_energy = energy;

            refresh_internals(state, &gradient)?;
            cur_step += 1;
        }
    }
}

/// Move the walk's internal coordinates to the current geometry, deriving a
/// new primitive set if one of the old primitives became ill-defined, and
/// record the rms of the gradient expressed in them.
fn refresh_internals(state: &mut WalkState, gradient: &DVector<f64>) -> IrcResult<()> {
    let coords3d = to_coords3d(&state.current);
    if state.internals.prims_valid_at(&coords3d) {
        state.internals.set_coords(coords3d)?;
    } else {
        state.internals = state.internals.rebuilt_at(coords3d)?;
        state.rebuilds += 1;
    }
    let int_gradient = state.internals.transform_gradient(gradient)?;
    let rms = if int_gradient.is_empty() {
        0.0
    } else {
        (int_gradient.norm_squared() / int_gradient.len() as f64).sqrt()
    };
    debug!("rms(internal gradient) = {:.6e}", rms);
    state.internal_gradient_rms.push(rms);
    Ok(())
}

/// Pick the transition mode of the mass-weighted TS Hessian and size the
/// initial step so that a quadratic model drops by `energy_lowering`.
pub fn initial_displacement(
    mw_hessian: &DMatrix<f64>,
    mass_sqrt_inv: &DMatrix<f64>,
    energy_lowering: f64,
    degenerate_mode_ratio: f64,
) -> IrcResult<InitialDisplacement> {
    if mw_hessian.nrows() != mass_sqrt_inv.nrows() || !mw_hessian.is_square() {
        return Err(IrcError::DimensionMismatch {
            context: "mass-weighted Hessian",
            expected: mass_sqrt_inv.nrows(),
            actual: mw_hessian.nrows(),
        });
    }

    let eigen = SymmetricEigen::new(mw_hessian.clone());
    let (mode_index, eigenvalue) = eigen
        .eigenvalues
        .iter()
        .copied()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or(IrcError::DimensionMismatch {
            context: "mass-weighted Hessian",
            expected: 3,
            actual: 0,
        })?;

    warn!("Only considering the smallest eigenvalue for the transition vector.");
    if eigenvalue >= 0.0 {
        warn!(
            "Smallest eigenvalue {:.6e} is not negative, the start is no transition state",
            eigenvalue
        );
    }
    if eigenvalue.abs() < FLAT_MODE_EPS {
        return Err(IrcError::FlatTransitionMode(eigenvalue));
    }

    let degeneracy = if eigenvalue < 0.0 {
        let competing: Vec<(usize, f64)> = eigen
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .filter(|&(j, w)| j != mode_index && w < 0.0 && w / eigenvalue >= degenerate_mode_ratio)
            .collect();
        (!competing.is_empty()).then(|| DegenerateModeWarning {
            selected: (mode_index, eigenvalue),
            competing,
        })
    } else {
        None
    };
    if let Some(warning) = &degeneracy {
        warn!("Ambiguous transition mode: {}", warning);
    }

    let mw_mode = eigen.eigenvectors.column(mode_index).into_owned();
    let transition_vector = (mass_sqrt_inv * mw_mode).normalize();
    let step_length = (2.0 * energy_lowering / eigenvalue.abs()).sqrt();
    let displacement = &transition_vector * step_length;
    info!(
        "Transition mode {} with eigenvalue {:.6e}, initial step length {:.4}",
        mode_index, eigenvalue, step_length
    );

    Ok(InitialDisplacement {
        modes: NormalModes {
            eigenvalues: eigen.eigenvalues,
            eigenvectors: eigen.eigenvectors,
        },
        mode_index,
        eigenvalue,
        transition_vector,
        step_length,
        displacement,
        degeneracy,
    })
}
