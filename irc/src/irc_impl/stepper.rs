//! Path-following steps along the mass-weighted steepest-descent direction.

use crate::error::{IrcError, IrcResult};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Gradients with a smaller mass-weighted norm define no direction.
const MIN_DIRECTION_NORM: f64 = 1e-12;

/// Everything a stepper may look at for one step.
pub struct StepContext<'a> {
    pub coords: &'a DVector<f64>,
    pub gradient: &'a DVector<f64>,
    pub hessian: &'a DMatrix<f64>,
    pub mass_sqrt_inv: &'a DMatrix<f64>,
    pub step_length: f64,
}

/// One IRC macro-iteration: returns a Cartesian displacement whose Euclidean
/// length is `step_length`, pointing downhill.
pub trait PathStepper {
    fn name(&self) -> &'static str;

    fn step(&self, ctx: &StepContext<'_>) -> IrcResult<DVector<f64>>;
}

/// Cartesian image of the mass-weighted steepest-descent direction,
/// -M^-1/2 M^-1/2 g, scaled to `step_length`.
fn descent_step(
    gradient: &DVector<f64>,
    mass_sqrt_inv: &DMatrix<f64>,
    step_length: f64,
) -> IrcResult<DVector<f64>> {
    let mw_gradient = mass_sqrt_inv * gradient;
    let direction = -(mass_sqrt_inv * mw_gradient);
    let norm = direction.norm();
    if !(norm > MIN_DIRECTION_NORM) {
        return Err(IrcError::StationaryPoint {
            gradient_norm: gradient.norm(),
        });
    }
    Ok(direction * (step_length / norm))
}

/// Plain steepest descent on the current gradient.
pub struct EulerStepper;

impl PathStepper for EulerStepper {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(&self, ctx: &StepContext<'_>) -> IrcResult<DVector<f64>> {
        descent_step(ctx.gradient, ctx.mass_sqrt_inv, ctx.step_length)
    }
}

/// Euler predictor, then a second descent step on the gradient the local
/// quadratic model predicts at the step midpoint.
pub struct HessianPredictorStepper;

impl PathStepper for HessianPredictorStepper {
    fn name(&self) -> &'static str {
        "hessian_predictor"
    }

    fn step(&self, ctx: &StepContext<'_>) -> IrcResult<DVector<f64>> {
        let predictor = descent_step(ctx.gradient, ctx.mass_sqrt_inv, ctx.step_length)?;
        let midpoint_gradient = ctx.gradient + ctx.hessian * &predictor * 0.5;
        match descent_step(&midpoint_gradient, ctx.mass_sqrt_inv, ctx.step_length) {
            Ok(corrected) => Ok(corrected),
            Err(IrcError::StationaryPoint { .. }) => Ok(predictor),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepperKind {
    #[default]
    Euler,
    HessianPredictor,
}

impl FromStr for StepperKind {
    type Err = IrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "euler" => Ok(Self::Euler),
            "hessian_predictor" | "hp" => Ok(Self::HessianPredictor),
            _ => Err(IrcError::Configuration(format!("Unknown IRC stepper: {}", s))),
        }
    }
}

pub fn create_stepper(kind: StepperKind) -> Box<dyn PathStepper> {
    match kind {
        StepperKind::Euler => Box::new(EulerStepper),
        StepperKind::HessianPredictor => Box::new(HessianPredictorStepper),
    }
}
