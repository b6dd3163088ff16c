//! Redundant internal coordinates: primitive stretches, bends and proper
//! dihedrals, their validity checks, and the Wilson B-matrix machinery that
//! carries gradients and Hessians between Cartesian and internal space.

pub mod constants;
pub mod elements;
pub mod error;
pub mod findiff;
pub mod primitives;
pub mod redundant;
pub mod setup;
pub mod valid;
pub mod zmat;

pub use error::{IntCoordError, Result};
pub use primitives::{PrimType, Primitive};
pub use redundant::RedundantCoords;
pub use valid::{check_typed_prims, ValidityThresholds};

use nalgebra::{DVector, Vector3};

/// Split a flat 3N coordinate vector into per-atom positions.
pub fn to_coords3d(cart: &DVector<f64>) -> Vec<Vector3<f64>> {
    cart.as_slice()
        .chunks_exact(3)
        .map(Vector3::from_column_slice)
        .collect()
}

/// Flatten per-atom positions into a 3N vector.
pub fn to_cart(coords3d: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(3 * coords3d.len(), coords3d.iter().flat_map(|c| c.iter().copied()))
}
