//! Analytic valence force field.
//!
//! Harmonic stretches and bends around a reference geometry plus a cosine
//! torsion on every proper dihedral. Each torsion sits on its barrier top at
//! the reference, so a molecule with a single dihedral gets a first-order
//! saddle point there, which makes the model a convenient stand-in for an
//! electronic-structure code when following reaction paths.

use crate::error::{IrcError, IrcResult};
use crate::provider::CoordinateProvider;
use intcoords::elements::atomic_mass;
use intcoords::{to_coords3d, PrimType, Primitive, RedundantCoords, ValidityThresholds};
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Force constants in Hartree/Bohr^2 and Hartree/rad^2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub bond_k: f64,
    pub bend_k: f64,
    pub torsion_barrier: f64,
    pub torsion_periodicity: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            bond_k: 0.45,
            bend_k: 0.16,
            torsion_barrier: 0.01,
            torsion_periodicity: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Term {
    Harmonic { k: f64, q0: f64 },
    /// `barrier/2 (1 + cos(n (phi - phi0)))`
    Torsion {
        barrier: f64,
        periodicity: f64,
        phi0: f64,
    },
}

impl Term {
    /// Energy, dV/dq and d2V/dq2 at `q`.
    pub fn evaluate(&self, q: f64) -> (f64, f64, f64) {
        match *self {
            Term::Harmonic { k, q0 } => {
                let d = q - q0;
                (0.5 * k * d * d, k * d, k)
            }
            Term::Torsion {
                barrier,
                periodicity: n,
                phi0,
            } => {
                let arg = n * (q - phi0);
                (
                    0.5 * barrier * (1.0 + arg.cos()),
                    -0.5 * barrier * n * arg.sin(),
                    -0.5 * barrier * n * n * arg.cos(),
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValenceForceField {
    atoms: Vec<String>,
    masses: Vec<f64>,
    prims: Vec<Primitive>,
    terms: Vec<Term>,
    evaluations: usize,
}

impl ValenceForceField {
    /// One term per valid primitive found at `reference` (Bohr).
    pub fn new(
        atoms: Vec<String>,
        reference: &[Vector3<f64>],
        params: ModelParams,
        thresholds: ValidityThresholds,
    ) -> IrcResult<Self> {
        let internals = RedundantCoords::new(atoms.clone(), reference.to_vec(), thresholds)?;
        let prims = internals.typed_prims().to_vec();
        let terms = prims
            .iter()
            .map(|prim| {
                let q0 = prim.value(reference);
                match prim.kind() {
                    PrimType::Stretch => Term::Harmonic {
                        k: params.bond_k,
                        q0,
                    },
                    PrimType::Bend | PrimType::LinearBend | PrimType::LinearBendComplement => {
                        Term::Harmonic {
                            k: params.bend_k,
                            q0,
                        }
                    }
                    PrimType::ProperDihedral => Term::Torsion {
                        barrier: params.torsion_barrier,
                        periodicity: params.torsion_periodicity as f64,
                        phi0: q0,
                    },
                }
            })
            .collect();
        Self::from_terms(atoms, prims, terms)
    }

    /// Fails for element symbols without a tabulated mass.
    pub fn from_terms(
        atoms: Vec<String>,
        prims: Vec<Primitive>,
        terms: Vec<Term>,
    ) -> IrcResult<Self> {
        let masses = atoms
            .iter()
            .map(|symbol| atomic_mass(symbol))
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(ValenceForceField {
            atoms,
            masses,
            prims,
            terms,
            evaluations: 0,
        })
    }

    pub fn prims(&self) -> &[Primitive] {
        &self.prims
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of energy, gradient and Hessian requests served so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    fn prepare(&mut self, coords: &DVector<f64>) -> IrcResult<Vec<Vector3<f64>>> {
        let expected = 3 * self.atoms.len();
        if coords.len() != expected {
            return Err(IrcError::DimensionMismatch {
                context: "model coordinates",
                expected,
                actual: coords.len(),
            });
        }
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(IrcError::Provider(
                "non-finite coordinates passed to the force field".to_string(),
            ));
        }
        self.evaluations += 1;
        Ok(to_coords3d(coords))
    }
}

impl CoordinateProvider for ValenceForceField {
    fn atoms(&self) -> &[String] {
        &self.atoms
    }

    fn masses(&self) -> &[f64] {
        &self.masses
    }

    fn energy(&mut self, coords: &DVector<f64>) -> IrcResult<f64> {
        let coords3d = self.prepare(coords)?;
        let energy = self
            .prims
            .iter()
            .zip(&self.terms)
            .map(|(prim, term)| term.evaluate(prim.value(&coords3d)).0)
            .sum();
        debug!("Force field energy: {:.10}", energy);
        Ok(energy)
    }

    fn gradient(&mut self, coords: &DVector<f64>) -> IrcResult<DVector<f64>> {
        let coords3d = self.prepare(coords)?;
        let mut gradient = DVector::zeros(coords.len());
        for (prim, term) in self.prims.iter().zip(&self.terms) {
            let (_, dv, _) = term.evaluate(prim.value(&coords3d));
            gradient.axpy(dv, &prim.gradient(&coords3d), 1.0);
        }
        Ok(gradient)
    }

    fn hessian(&mut self, coords: &DVector<f64>) -> IrcResult<DMatrix<f64>> {
        let coords3d = self.prepare(coords)?;
        let n = coords.len();
        let mut hessian = DMatrix::zeros(n, n);
        for (prim, term) in self.prims.iter().zip(&self.terms) {
            let (_, dv, d2v) = term.evaluate(prim.value(&coords3d));
            let row = prim.gradient(&coords3d);
            hessian.ger(d2v, &row, &row, 1.0);
            prim.accumulate_second_derivative(&coords3d, dv, &mut hessian);
        }
        Ok(hessian)
    }
}
