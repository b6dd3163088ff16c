//! Geometric validity checks for primitive internal coordinates.
//!
//! Bends close to 180 degrees and dihedrals whose outer bonds line up with the
//! central bond have ill-defined derivatives. These checks drop them before
//! they enter a B-matrix.

use crate::primitives::Primitive;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Collinearity threshold for the vectors spanning a dihedral, in degrees.
pub const DEFAULT_COLLINEAR_DEG: f64 = 179.18971;

/// Bend angle in degrees, inclusive range check.
pub fn is_bend_valid(coords3d: &[Vector3<f64>], bend: [usize; 3], min_deg: f64, max_deg: f64) -> bool {
    let deg = Primitive::Bend(bend).value(coords3d).to_degrees();
    min_deg <= deg && deg <= max_deg
}

/// Two unit vectors are collinear when the angle between them (or its
/// supplement) is at least `deg_thresh`.
pub fn are_collinear(a: &Vector3<f64>, b: &Vector3<f64>, deg_thresh: f64) -> bool {
    let thresh = deg_thresh.to_radians().cos();
    a.dot(b).abs() >= thresh.abs()
}

pub fn is_dihedral_valid(coords3d: &[Vector3<f64>], dihedral: [usize; 4], deg_thresh: f64) -> bool {
    let [m, o, p, n] = dihedral;
    let u = coords3d[m] - coords3d[o];
    let v = coords3d[n] - coords3d[p];
    let w = coords3d[p] - coords3d[o];
    let (Some(u), Some(v), Some(w)) = (u.try_normalize(1e-12), v.try_normalize(1e-12), w.try_normalize(1e-12))
    else {
        return false;
    };
    !(are_collinear(&u, &w, deg_thresh) || are_collinear(&v, &w, deg_thresh))
}

/// True if every dihedral passes the default collinearity check. Invalid
/// ones are logged.
pub fn dihedrals_are_valid(coords3d: &[Vector3<f64>], dihedrals: &[[usize; 4]]) -> bool {
    let invalid: Vec<&[usize; 4]> = dihedrals
        .iter()
        .filter(|inds| !is_dihedral_valid(coords3d, **inds, DEFAULT_COLLINEAR_DEG))
        .collect();
    if !invalid.is_empty() {
        info!("Invalid dihedrals: {:?}", invalid);
    }
    invalid.is_empty()
}

/// Returns the primitives that are well defined at `coords3d`, keeping their
/// order. Bends must lie in `[bend_min_deg, lb_min_deg]` and linear bends in
/// `[lb_min_deg, 180]`; dihedrals are checked for collinearity with
/// `dihed_max_deg`. Stretches always pass.
pub fn check_typed_prims(
    coords3d: &[Vector3<f64>],
    typed_prims: &[Primitive],
    bend_min_deg: f64,
    dihed_max_deg: f64,
    lb_min_deg: f64,
) -> Vec<Primitive> {
    let mut valid = Vec::with_capacity(typed_prims.len());
    for prim in typed_prims {
        let keep = match *prim {
            Primitive::Stretch(_) => true,
            Primitive::Bend(inds) => is_bend_valid(coords3d, inds, bend_min_deg, lb_min_deg),
            Primitive::LinearBend(inds) | Primitive::LinearBendComplement(inds) => {
                is_bend_valid(coords3d, inds, lb_min_deg, 180.0)
            }
            Primitive::ProperDihedral(inds) => is_dihedral_valid(coords3d, inds, dihed_max_deg),
        };
        if keep {
            valid.push(*prim);
        } else {
            info!("Dropping invalid primitive {}", prim);
        }
    }
    valid
}

/// Angle limits used when validating a primitive set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityThresholds {
    pub bend_min_deg: f64,
    pub dihedral_max_deg: f64,
    pub linear_bend_min_deg: f64,
}

impl Default for ValidityThresholds {
    fn default() -> Self {
        ValidityThresholds {
            bend_min_deg: 15.0,
            dihedral_max_deg: 175.0,
            linear_bend_min_deg: 175.0,
        }
    }
}

impl ValidityThresholds {
    pub fn check(&self, coords3d: &[Vector3<f64>], typed_prims: &[Primitive]) -> Vec<Primitive> {
        check_typed_prims(
            coords3d,
            typed_prims,
            self.bend_min_deg,
            self.dihedral_max_deg,
            self.linear_bend_min_deg,
        )
    }
}
