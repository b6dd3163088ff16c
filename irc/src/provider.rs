//! Interface to whatever supplies energies and derivatives.

use crate::error::IrcResult;
use nalgebra::{DMatrix, DVector};

/// Energy, gradient and Hessian oracle for a fixed set of atoms.
///
/// Coordinates are flat 3N vectors in Bohr, in one fixed atom order for the
/// lifetime of the provider. Calls may be expensive and may mutate internal
/// state (caches, call counters), hence `&mut self`.
pub trait CoordinateProvider {
    fn atoms(&self) -> &[String];

    /// Atomic masses in amu, one per atom.
    fn masses(&self) -> &[f64];

    fn energy(&mut self, coords: &DVector<f64>) -> IrcResult<f64>;

    fn gradient(&mut self, coords: &DVector<f64>) -> IrcResult<DVector<f64>>;

    fn hessian(&mut self, coords: &DVector<f64>) -> IrcResult<DMatrix<f64>>;

    /// Diagonal 3N x 3N matrix of inverse square roots of the masses.
    fn mass_sqrt_inverse(&self) -> DMatrix<f64> {
        let diag = DVector::from_iterator(
            3 * self.masses().len(),
            self.masses().iter().flat_map(|m| std::iter::repeat(1.0 / m.sqrt()).take(3)),
        );
        DMatrix::from_diagonal(&diag)
    }

    /// Hessian scaled by the inverse square roots of the masses on both sides.
    fn mass_weighted_hessian(&mut self, coords: &DVector<f64>) -> IrcResult<DMatrix<f64>> {
        let mm_sqrt_inv = self.mass_sqrt_inverse();
        let hessian = self.hessian(coords)?;
        Ok(&mm_sqrt_inv * hessian * &mm_sqrt_inv)
    }
}
