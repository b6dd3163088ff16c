//! Redundant internal coordinates and the Cartesian <-> internal transforms
//! of gradients and Hessians.

use crate::error::{IntCoordError, Result};
use crate::primitives::Primitive;
use crate::setup::setup_primitives;
use crate::valid::ValidityThresholds;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use tracing::{debug, info};

/// Singular values below this fraction of the largest one count as zero.
const SVD_RTOL: f64 = 1e-8;

/// Perpendicular distance (Bohr) below which an atom lies on the molecular axis.
const LINEAR_TOL: f64 = 1e-3;

/// A frozen set of primitives for one working session, together with the
/// Wilson B-matrix and its pseudo-inverse at the current geometry.
#[derive(Debug, Clone)]
pub struct RedundantCoords {
    atoms: Vec<String>,
    coords3d: Vec<Vector3<f64>>,
    thresholds: ValidityThresholds,
    define_prims: Vec<Primitive>,
    typed_prims: Vec<Primitive>,
    b_matrix: DMatrix<f64>,
    b_inv: DMatrix<f64>,
}

impl RedundantCoords {
    /// Derive primitives from connectivity and keep the valid ones.
    pub fn new(
        atoms: Vec<String>,
        coords3d: Vec<Vector3<f64>>,
        thresholds: ValidityThresholds,
    ) -> Result<Self> {
        Self::with_define_prims(atoms, coords3d, thresholds, Vec::new())
    }

    /// Like [`RedundantCoords::new`], with extra user-defined primitives
    /// appended to the generated set.
    pub fn with_define_prims(
        atoms: Vec<String>,
        coords3d: Vec<Vector3<f64>>,
        thresholds: ValidityThresholds,
        define_prims: Vec<Primitive>,
    ) -> Result<Self> {
        check_dimensions(&atoms, &coords3d)?;
        check_indices(&define_prims, coords3d.len())?;

        let generated = setup_primitives(&atoms, &coords3d, thresholds.linear_bend_min_deg)?;
        let candidates: Vec<Primitive> = generated
            .into_iter()
            .chain(define_prims.iter().copied())
            .unique()
            .collect();
        let typed_prims = thresholds.check(&coords3d, &candidates);
        debug!(
            "Kept {} of {} primitives after validity check",
            typed_prims.len(),
            candidates.len()
        );
        Self::build(atoms, coords3d, thresholds, define_prims, typed_prims)
    }

    /// Use exactly the given primitives (deduplicated), without the validity
    /// filter.
    pub fn from_typed_prims(
        atoms: Vec<String>,
        coords3d: Vec<Vector3<f64>>,
        typed_prims: Vec<Primitive>,
    ) -> Result<Self> {
        check_dimensions(&atoms, &coords3d)?;
        check_indices(&typed_prims, coords3d.len())?;
        let typed_prims = typed_prims.into_iter().unique().collect();
        Self::build(atoms, coords3d, ValidityThresholds::default(), Vec::new(), typed_prims)
    }

    fn build(
        atoms: Vec<String>,
        coords3d: Vec<Vector3<f64>>,
        thresholds: ValidityThresholds,
        define_prims: Vec<Primitive>,
        typed_prims: Vec<Primitive>,
    ) -> Result<Self> {
        let mut coords = RedundantCoords {
            atoms,
            coords3d,
            thresholds,
            define_prims,
            typed_prims,
            b_matrix: DMatrix::zeros(0, 0),
            b_inv: DMatrix::zeros(0, 0),
        };
        coords.update_b_matrix()?;
        Ok(coords)
    }

    /// Recompute B and its pseudo-inverse at the stored geometry.
    fn update_b_matrix(&mut self) -> Result<()> {
        let ncart = 3 * self.coords3d.len();
        let rows: Vec<DVector<f64>> = self
            .typed_prims
            .par_iter()
            .map(|prim| prim.gradient(&self.coords3d))
            .collect();
        let b_matrix = DMatrix::from_fn(rows.len(), ncart, |r, c| rows[r][c]);

        let required = self.required_rank();
        if b_matrix.nrows() == 0 {
            if required > 0 {
                return Err(IntCoordError::Underdetermined { rank: 0, required });
            }
            self.b_inv = DMatrix::zeros(ncart, 0);
            self.b_matrix = b_matrix;
            return Ok(());
        }

        let svd = b_matrix.clone().svd(true, true);
        let smax = svd.singular_values.max();
        let eps = SVD_RTOL * smax;
        let rank = svd.singular_values.iter().filter(|&&s| s > eps).count();
        if rank < required {
            return Err(IntCoordError::Underdetermined { rank, required });
        }
        self.b_inv = svd
            .pseudo_inverse(eps)
            .map_err(|e| IntCoordError::Linalg(e.to_string()))?;
        self.b_matrix = b_matrix;
        Ok(())
    }

    /// Number of internal degrees of freedom the primitives must span.
    pub fn required_rank(&self) -> usize {
        let natoms = self.coords3d.len();
        match natoms {
            0 | 1 => 0,
            _ if self.is_linear() => 3 * natoms - 5,
            _ => 3 * natoms - 6,
        }
    }

    /// All atoms on one line.
    pub fn is_linear(&self) -> bool {
        let Some(&origin) = self.coords3d.first() else {
            return false;
        };
        let axis = self
            .coords3d
            .iter()
            .map(|c| c - origin)
            .find_map(|d| d.try_normalize(LINEAR_TOL));
        match axis {
            None => true,
            Some(axis) => self.coords3d.iter().all(|c| {
                let d = c - origin;
                (d - axis * d.dot(&axis)).norm() < LINEAR_TOL
            }),
        }
    }

    /// Move to a new geometry keeping the primitive set. Fails if the
    /// primitives no longer span the internal space there.
    pub fn set_coords(&mut self, coords3d: Vec<Vector3<f64>>) -> Result<()> {
        if coords3d.len() != self.coords3d.len() {
            return Err(IntCoordError::DimensionMismatch {
                context: "coordinates",
                expected: self.coords3d.len(),
                actual: coords3d.len(),
            });
        }
        self.coords3d = coords3d;
        self.update_b_matrix()
    }

    /// True if every active primitive is still well defined at `coords3d`.
    pub fn prims_valid_at(&self, coords3d: &[Vector3<f64>]) -> bool {
        self.thresholds.check(coords3d, &self.typed_prims).len() == self.typed_prims.len()
    }

    /// Fresh coordinate set at `coords3d`, derived with the same atoms,
    /// thresholds and user primitives.
    pub fn rebuilt_at(&self, coords3d: Vec<Vector3<f64>>) -> Result<Self> {
        let rebuilt = Self::with_define_prims(
            self.atoms.clone(),
            coords3d,
            self.thresholds,
            self.define_prims.clone(),
        )?;
        info!(
            "Rebuilt internal coordinates: {} -> {} primitives",
            self.typed_prims.len(),
            rebuilt.typed_prims.len()
        );
        Ok(rebuilt)
    }

    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    pub fn coords3d(&self) -> &[Vector3<f64>] {
        &self.coords3d
    }

    pub fn typed_prims(&self) -> &[Primitive] {
        &self.typed_prims
    }

    pub fn thresholds(&self) -> &ValidityThresholds {
        &self.thresholds
    }

    /// Wilson B-matrix, one row per primitive.
    pub fn b_matrix(&self) -> &DMatrix<f64> {
        &self.b_matrix
    }

    /// Generalized inverse of B (3N x P).
    pub fn b_inv(&self) -> &DMatrix<f64> {
        &self.b_inv
    }

    pub fn prim_values(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.typed_prims.len(),
            self.typed_prims.iter().map(|p| p.value(&self.coords3d)),
        )
    }

    /// Projector B B+ onto the non-redundant part of the primitive space.
    pub fn projector(&self) -> DMatrix<f64> {
        &self.b_matrix * &self.b_inv
    }

    pub fn transform_gradient(&self, cart_gradient: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_cart_len("Cartesian gradient", cart_gradient.len())?;
        Ok(self.b_inv.tr_mul(cart_gradient))
    }

    pub fn backtransform_gradient(&self, int_gradient: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_prim_len("internal gradient", int_gradient.len())?;
        Ok(self.b_matrix.tr_mul(int_gradient))
    }

    /// Curvature correction K = sum_i g_i d2q_i/dx2.
    pub fn k_matrix(&self, int_gradient: &DVector<f64>) -> Result<DMatrix<f64>> {
        self.check_prim_len("internal gradient", int_gradient.len())?;
        let ncart = 3 * self.coords3d.len();
        let mut k = DMatrix::zeros(ncart, ncart);
        for (prim, &g) in self.typed_prims.iter().zip(int_gradient.iter()) {
            prim.accumulate_second_derivative(&self.coords3d, g, &mut k);
        }
        Ok(k)
    }

    /// H_int = B+^T (H_cart - K) B+
    pub fn transform_hessian(
        &self,
        cart_hessian: &DMatrix<f64>,
        int_gradient: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        self.check_cart_len("Cartesian Hessian", cart_hessian.nrows())?;
        self.check_cart_len("Cartesian Hessian", cart_hessian.ncols())?;
        let k = self.k_matrix(int_gradient)?;
        Ok(self.b_inv.transpose() * (cart_hessian - k) * &self.b_inv)
    }

    /// H_cart = B^T H_int B + K
    pub fn backtransform_hessian(
        &self,
        int_hessian: &DMatrix<f64>,
        int_gradient: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        self.check_prim_len("internal Hessian", int_hessian.nrows())?;
        self.check_prim_len("internal Hessian", int_hessian.ncols())?;
        let k = self.k_matrix(int_gradient)?;
        Ok(self.b_matrix.transpose() * int_hessian * &self.b_matrix + k)
    }

    fn check_cart_len(&self, context: &'static str, actual: usize) -> Result<()> {
        let expected = 3 * self.coords3d.len();
        if actual != expected {
            return Err(IntCoordError::DimensionMismatch {
                context,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn check_prim_len(&self, context: &'static str, actual: usize) -> Result<()> {
        let expected = self.typed_prims.len();
        if actual != expected {
            return Err(IntCoordError::DimensionMismatch {
                context,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

fn check_dimensions(atoms: &[String], coords3d: &[Vector3<f64>]) -> Result<()> {
    if atoms.len() != coords3d.len() {
        return Err(IntCoordError::DimensionMismatch {
            context: "atoms vs. coordinates",
            expected: atoms.len(),
            actual: coords3d.len(),
        });
    }
    Ok(())
}

fn check_indices(prims: &[Primitive], natoms: usize) -> Result<()> {
    for prim in prims {
        if let Some(&index) = prim.atoms().iter().find(|&&i| i >= natoms) {
            return Err(IntCoordError::InvalidAtomIndex { index, natoms });
        }
    }
    Ok(())
}
