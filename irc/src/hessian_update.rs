//! Updates of the working Hessian between provider Hessian evaluations.

use crate::error::IrcError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const SMALL: f64 = 1e-14;
const RMIN2: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianUpdate {
    /// Weighted Murtagh-Sargent / Powell-symmetric-Broyden update; does not
    /// force positive definiteness.
    #[default]
    Bofill,
    /// Keep the Hessian fixed.
    None,
}

impl FromStr for HessianUpdate {
    type Err = IrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bofill" => Ok(Self::Bofill),
            "none" => Ok(Self::None),
            _ => Err(IrcError::Configuration(format!("Unknown Hessian update: {}", s))),
        }
    }
}

impl HessianUpdate {
    pub fn apply(
        &self,
        hessian: &DMatrix<f64>,
        delta_x: &DVector<f64>,
        delta_g: &DVector<f64>,
    ) -> DMatrix<f64> {
        match self {
            HessianUpdate::Bofill => bofill_update(hessian, delta_x, delta_g),
            HessianUpdate::None => hessian.clone(),
        }
    }
}

/// Bofill update from step `delta_x` and gradient change `delta_g`.
///
/// ```text
/// xi  = dg - H dx
/// MS  = xi xi^T / (dx.xi)
/// PSB = (xi dx^T + dx xi^T) / |dx|^2 - (dx.xi) dx dx^T / |dx|^4
/// phi = (dx.xi)^2 / (|dx|^2 |xi|^2)
/// H'  = H + phi MS + (1 - phi) PSB
/// ```
///
/// Degenerate or non-finite input leaves the Hessian untouched.
pub fn bofill_update(
    hessian: &DMatrix<f64>,
    delta_x: &DVector<f64>,
    delta_g: &DVector<f64>,
) -> DMatrix<f64> {
    if !delta_x.iter().chain(delta_g.iter()).all(|v| v.is_finite()) {
        return hessian.clone();
    }
    let dx2 = delta_x.norm_squared();
    if dx2 < RMIN2 {
        return hessian.clone();
    }
    let xi = delta_g - hessian * delta_x;
    let xi2 = xi.norm_squared();
    if xi2 < SMALL {
        return hessian.clone();
    }

    let dx_xi = delta_x.dot(&xi);
    let psb = (&xi * delta_x.transpose() + delta_x * xi.transpose()) / dx2
        - delta_x * delta_x.transpose() * (dx_xi / (dx2 * dx2));

    if dx_xi.abs() <= SMALL {
        return hessian + psb;
    }
    let phi = dx_xi * dx_xi / (dx2 * xi2);
    let ms = &xi * xi.transpose() / dx_xi;
    hessian + ms * phi + psb * (1.0 - phi)
}
