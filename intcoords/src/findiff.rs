//! Finite-difference reference derivatives of primitive internal coordinates.
//!
//! Used to check the analytic B-matrix rows and their derivatives, never
//! on the production path.

use crate::error::{IntCoordError, Result};
use crate::primitives::Primitive;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::debug;

pub const DEFAULT_DELTA: f64 = 1e-4;
pub const DEFAULT_SECOND_DELTA: f64 = 1e-6;
pub const DEFAULT_RTOL: f64 = 1e-7;
pub const DEFAULT_ATOL: f64 = 1e-8;

/// Wrap an angle difference into (-pi, pi].
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

fn displaced(coords3d: &[Vector3<f64>], atom: usize, axis: usize, step: f64) -> Vec<Vector3<f64>> {
    let mut coords = coords3d.to_vec();
    coords[atom][axis] += step;
    coords
}

/// Central-difference gradient of the primitive value over all 3N
/// coordinates. Only the primitive's own atoms are displaced.
pub fn prim_findiff(prim: &Primitive, coords3d: &[Vector3<f64>], delta: f64) -> DVector<f64> {
    let mut grad = DVector::zeros(3 * coords3d.len());
    for &atom in prim.atoms() {
        for axis in 0..3 {
            let plus = prim.value(&displaced(coords3d, atom, axis, delta));
            let minus = prim.value(&displaced(coords3d, atom, axis, -delta));
            let diff = match prim {
                Primitive::ProperDihedral(_) => wrap_angle(plus - minus),
                _ => plus - minus,
            };
            grad[3 * atom + axis] = diff / (2.0 * delta);
        }
    }
    grad
}

/// Central-difference derivatives of the analytic B-matrix row, restricted
/// to the primitive's atoms in `atoms()` order. Row `r` is the gradient
/// component, column `c` the displaced coordinate.
pub fn b_findiff(prim: &Primitive, coords3d: &[Vector3<f64>], delta: f64) -> DMatrix<f64> {
    let atoms = prim.atoms();
    let local = |grad: &DVector<f64>| -> DVector<f64> {
        DVector::from_fn(3 * atoms.len(), |r, _| grad[3 * atoms[r / 3] + r % 3])
    };
    let columns: Vec<DVector<f64>> = (0..3 * atoms.len())
        .into_par_iter()
        .map(|c| {
            let (atom, axis) = (atoms[c / 3], c % 3);
            let plus = prim.gradient(&displaced(coords3d, atom, axis, delta));
            let minus = prim.gradient(&displaced(coords3d, atom, axis, -delta));
            (local(&plus) - local(&minus)) / (2.0 * delta)
        })
        .collect();
    DMatrix::from_columns(&columns)
}

fn max_deviation(analytic: &[f64], numeric: &[f64], rtol: f64, atol: f64) -> Option<f64> {
    let mut worst = None;
    for (a, n) in analytic.iter().zip(numeric) {
        let dev = (a - n).abs();
        if dev > atol + rtol * a.abs() {
            worst = Some(worst.map_or(dev, |w: f64| w.max(dev)));
        }
    }
    worst
}

/// Compare the analytic B-matrix row against [`prim_findiff`].
pub fn compare_prim_gradient(
    prim: &Primitive,
    coords3d: &[Vector3<f64>],
    delta: f64,
    rtol: f64,
    atol: f64,
) -> Result<()> {
    let analytic = prim.gradient(coords3d);
    let numeric = prim_findiff(prim, coords3d, delta);
    match max_deviation(analytic.as_slice(), numeric.as_slice(), rtol, atol) {
        None => {
            debug!("Gradient of {} agrees with finite differences", prim);
            Ok(())
        }
        Some(max_deviation) => Err(IntCoordError::ComparisonMismatch {
            quantity: "gradient",
            primitive: prim.to_string(),
            max_deviation,
        }),
    }
}

/// Compare the analytic second derivatives against [`b_findiff`].
pub fn compare_second_derivative(
    prim: &Primitive,
    coords3d: &[Vector3<f64>],
    delta: f64,
    atol: f64,
) -> Result<()> {
    let analytic = prim.local_second_derivative(coords3d);
    let numeric = b_findiff(prim, coords3d, delta);
    match max_deviation(analytic.as_slice(), numeric.as_slice(), 0.0, atol) {
        None => Ok(()),
        Some(max_deviation) => Err(IntCoordError::ComparisonMismatch {
            quantity: "second derivative",
            primitive: prim.to_string(),
            max_deviation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_small_differences() {
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-15);
        assert!((wrap_angle(-0.25) + 0.25).abs() < 1e-15);
        assert!((wrap_angle(2.0 * PI - 1e-4) + 1e-4).abs() < 1e-12);
        assert!((wrap_angle(-2.0 * PI + 1e-4) - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn anti_dihedral_gradient_survives_branch_cut() {
        // torsion of exactly pi: displacements flip the sign of the value
        let coords = vec![
            Vector3::new(1.0, 1.2, 0.0),
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, 2.7),
            Vector3::new(-1.0, -1.2, 2.7),
        ];
        let prim = Primitive::ProperDihedral([0, 1, 2, 3]);
        compare_prim_gradient(&prim, &coords, DEFAULT_DELTA, 1e-6, 1e-8).unwrap();
    }

    #[test]
    fn mismatch_is_reported() {
        let coords = vec![Vector3::zeros(), Vector3::new(1.0, 0.5, 0.2)];
        let prim = Primitive::Stretch([0, 1]);
        // a huge step ruins the numerical curvature
        let err = compare_second_derivative(&prim, &coords, 0.5, 1e-8).unwrap_err();
        assert!(matches!(err, IntCoordError::ComparisonMismatch { quantity: "second derivative", .. }));
        compare_second_derivative(&prim, &coords, 1e-5, 1e-7).unwrap();
    }

    #[test]
    fn b_findiff_is_local_and_symmetric() {
        let coords = vec![
            Vector3::new(0.1, -0.2, 0.05),
            Vector3::new(1.9, 0.1, 0.0),
            Vector3::new(-0.6, 1.7, 0.3),
            Vector3::new(8.0, 8.0, 8.0),
        ];
        let prim = Primitive::Bend([1, 0, 2]);
        let num = b_findiff(&prim, &coords, 1e-5);
        assert_eq!(num.shape(), (9, 9));
        assert!((&num - num.transpose()).amax() < 1e-6);
    }
}
