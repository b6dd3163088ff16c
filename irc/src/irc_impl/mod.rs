//! Intrinsic reaction coordinate integration.
//!
//! An [`Irc`] is built once from a transition state. It freezes the TS
//! coordinates, energy and Hessian, derives the initial displacement along the
//! imaginary mode, and then walks downhill in either direction. Each
//! directional walk owns its own working Hessian copied from the frozen TS
//! Hessian, so walks never influence each other.

mod irc;
mod stepper;

#[cfg(test)]
mod tests;

pub use self::irc::{initial_displacement, Irc};
pub use self::stepper::{
    create_stepper, EulerStepper, HessianPredictorStepper, PathStepper, StepContext, StepperKind,
};

use crate::error::{IrcError, IrcResult};
use crate::hessian_update::HessianUpdate;
use intcoords::{Primitive, ValidityThresholds};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::fmt;

/// Parameters of an IRC run. Validated once when the [`Irc`] is built.
#[derive(Debug, Clone, PartialEq)]
pub struct IrcConfig {
    /// Cartesian length of every macro-iteration step (Bohr).
    pub step_length: f64,
    pub max_steps: usize,
    pub forward: bool,
    pub backward: bool,
    /// Energy lowering (Hartree) the initial displacement aims for.
    pub energy_lowering: f64,
    /// A walk has converged once consecutive energies differ by at most this.
    pub energy_thresh: f64,
    pub stepper: StepperKind,
    pub hessian_update: HessianUpdate,
    /// Re-query the provider Hessian every n steps instead of updating it.
    pub hessian_recalc: Option<usize>,
    /// Other negative eigenvalues at least this fraction of the smallest one
    /// make the mode selection ambiguous.
    pub degenerate_mode_ratio: f64,
    pub thresholds: ValidityThresholds,
    pub define_prims: Vec<Primitive>,
}

impl Default for IrcConfig {
    fn default() -> Self {
        IrcConfig {
            step_length: 0.1,
            max_steps: 10,
            forward: true,
            backward: true,
            energy_lowering: 2.5e-4,
            energy_thresh: 1e-5,
            stepper: StepperKind::Euler,
            hessian_update: HessianUpdate::Bofill,
            hessian_recalc: None,
            degenerate_mode_ratio: 0.5,
            thresholds: ValidityThresholds::default(),
            define_prims: Vec::new(),
        }
    }
}

impl IrcConfig {
    pub fn validate(&self) -> IrcResult<()> {
        let positive = [
            ("step_length", self.step_length),
            ("energy_lowering", self.energy_lowering),
            ("energy_thresh", self.energy_thresh),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(IrcError::Configuration(format!(
                    "{} has to be > 0, got {}",
                    name, value
                )));
            }
        }
        if !self.forward && !self.backward {
            return Err(IrcError::Configuration(
                "at least one of forward and backward has to be enabled".to_string(),
            ));
        }
        if self.hessian_recalc == Some(0) {
            return Err(IrcError::Configuration(
                "hessian_recalc has to be at least 1".to_string(),
            ));
        }
        if !(self.degenerate_mode_ratio > 0.0 && self.degenerate_mode_ratio <= 1.0) {
            return Err(IrcError::Configuration(format!(
                "degenerate_mode_ratio has to lie in (0, 1], got {}",
                self.degenerate_mode_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Backward => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Why a directional walk stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    StepsExceeded,
    EnergyIncreased,
    EnergyConverged,
    /// A coordinate or provider error ended the walk; points recorded so far
    /// are kept.
    Aborted(IrcError),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::StepsExceeded => write!(f, "IRC steps exceeded"),
            Termination::EnergyIncreased => write!(f, "energy increased"),
            Termination::EnergyConverged => write!(f, "energy converged"),
            Termination::Aborted(err) => write!(f, "aborted: {}", err),
        }
    }
}

/// Result of walking downhill in one direction.
///
/// `coords[i]` is the geometry at the start of macro-iteration `i`;
/// `energies[i]` is the energy reached by that iteration's step.
#[derive(Debug, Clone)]
pub struct DirectionalWalk {
    pub direction: Direction,
    pub coords: Vec<DVector<f64>>,
    pub energies: Vec<f64>,
    pub termination: Termination,
    /// Rms of the gradient in the walk's internal coordinates at each of
    /// `coords`.
    pub internal_gradient_rms: Vec<f64>,
    /// How often the primitive set had to be derived anew.
    pub internal_rebuilds: usize,
}

impl DirectionalWalk {
    pub fn steps(&self) -> usize {
        self.coords.len()
    }
}

/// Mass-weighted eigenvalues above this count as zero (translations,
/// rotations, numerical noise).
pub const NEGATIVE_EIGENVALUE_TOL: f64 = 1e-8;

/// Eigen-decomposition of the mass-weighted TS Hessian.
#[derive(Debug, Clone)]
pub struct NormalModes {
    pub eigenvalues: DVector<f64>,
    /// Mass-weighted eigenvectors, one per column.
    pub eigenvectors: DMatrix<f64>,
}

impl NormalModes {
    /// Number of eigenvalues below `-NEGATIVE_EIGENVALUE_TOL`.
    pub fn negative_count(&self) -> usize {
        self.eigenvalues
            .iter()
            .filter(|&&w| w < -NEGATIVE_EIGENVALUE_TOL)
            .count()
    }
}

/// More than one comparably negative eigenvalue at the TS. The smallest one
/// is still used.
#[derive(Debug, Clone, PartialEq)]
pub struct DegenerateModeWarning {
    pub selected: (usize, f64),
    pub competing: Vec<(usize, f64)>,
}

impl fmt::Display for DegenerateModeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transition mode {} (eigenvalue {:.6e}) competes with {:?}",
            self.selected.0, self.selected.1, self.competing
        )
    }
}

#[derive(Debug, Clone)]
pub struct InitialDisplacement {
    pub modes: NormalModes,
    pub mode_index: usize,
    pub eigenvalue: f64,
    /// Normalized Cartesian image of the selected mass-weighted mode.
    pub transition_vector: DVector<f64>,
    pub step_length: f64,
    /// `step_length * transition_vector`, applied with +1 forward and -1
    /// backward.
    pub displacement: DVector<f64>,
    pub degeneracy: Option<DegenerateModeWarning>,
}

/// Both walks stitched together: reversed forward points, the TS, then the
/// backward points.
#[derive(Debug, Clone)]
pub struct IrcPath {
    pub coords: Vec<DVector<f64>>,
    pub energies: Vec<f64>,
    pub ts_index: usize,
}

#[derive(Debug, Clone)]
pub struct IrcRun {
    pub forward: Option<DirectionalWalk>,
    pub backward: Option<DirectionalWalk>,
    pub path: IrcPath,
}

impl IrcPath {
    pub fn assemble(
        forward: Option<&DirectionalWalk>,
        ts_coords: &DVector<f64>,
        ts_energy: f64,
        backward: Option<&DirectionalWalk>,
    ) -> Self {
        let mut coords = Vec::new();
        let mut energies = Vec::new();
        if let Some(walk) = forward {
            coords.extend(walk.coords.iter().rev().cloned());
            energies.extend(walk.energies.iter().rev().copied());
        }
        let ts_index = coords.len();
        coords.push(ts_coords.clone());
        energies.push(ts_energy);
        if let Some(walk) = backward {
            coords.extend(walk.coords.iter().cloned());
            energies.extend(walk.energies.iter().copied());
        }
        IrcPath {
            coords,
            energies,
            ts_index,
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}
