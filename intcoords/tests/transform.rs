//! Gradient and Hessian transforms between Cartesian and internal space.

use intcoords::zmat::geom_from_zmat_str;
use intcoords::{to_cart, to_coords3d, Primitive, RedundantCoords, ValidityThresholds};
use nalgebra::{DMatrix, DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const METHANOL: &str = "C
O 1 1.43
H 1 1.09 2 109.5
H 1 1.09 2 109.5 3 120.
H 1 1.09 2 109.5 3 -120.
H 2 0.96 1 108.5 3 180.
";

const WATER: &str = "O
H 1 0.96
H 1 0.96 2 104.5
";

fn coords_for(zmat: &str) -> RedundantCoords {
    let geom = geom_from_zmat_str(zmat).unwrap();
    RedundantCoords::new(geom.atoms, geom.coords3d, ValidityThresholds::default()).unwrap()
}

fn random_symmetric(n: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let a = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
    (&a + a.transpose()) * 0.5
}

#[test]
fn methanol_has_fifteen_primitives() {
    let rc = coords_for(METHANOL);
    assert_eq!(rc.typed_prims().len(), 15);
    assert_eq!(rc.required_rank(), 12);
    // redundancy: the projector has trace equal to the rank
    assert!((rc.projector().trace() - 12.0).abs() < 1e-8);
}

#[test]
fn hessian_round_trip_is_exact_on_non_redundant_space() {
    let rc = coords_for(METHANOL);
    let nprim = rc.typed_prims().len();
    let mut rng = StdRng::seed_from_u64(3);

    let h_int_ref = random_symmetric(nprim, &mut rng);
    let g_raw = DVector::from_fn(nprim, |_, _| rng.gen_range(-0.05..0.05));
    let proj = rc.projector();
    let g_int = &proj * g_raw;

    let cart_hessian = rc.backtransform_hessian(&h_int_ref, &g_int).unwrap();
    let h_int = rc.transform_hessian(&cart_hessian, &g_int).unwrap();
    let round_trip = rc.backtransform_hessian(&h_int, &g_int).unwrap();

    assert!((&round_trip - &cart_hessian).amax() < 1.5e-7);
    let projected = &proj * h_int_ref * &proj;
    assert!((h_int - projected).amax() < 1e-6);
}

/// E(x) = sum_i k_i/2 (q_i(x) - q0_i)^2 and its analytic Cartesian gradient.
struct QuadraticModel {
    prims: Vec<Primitive>,
    k: Vec<f64>,
    q0: Vec<f64>,
}

impl QuadraticModel {
    fn cart_gradient(&self, coords3d: &[Vector3<f64>]) -> DVector<f64> {
        let mut grad = DVector::zeros(3 * coords3d.len());
        for ((prim, k), q0) in self.prims.iter().zip(&self.k).zip(&self.q0) {
            grad += prim.gradient(coords3d) * (k * (prim.value(coords3d) - q0));
        }
        grad
    }

    fn numerical_hessian(&self, coords3d: &[Vector3<f64>], delta: f64) -> DMatrix<f64> {
        let cart = to_cart(coords3d);
        let n = cart.len();
        let mut hess = DMatrix::zeros(n, n);
        for j in 0..n {
            let mut plus = cart.clone();
            plus[j] += delta;
            let mut minus = cart.clone();
            minus[j] -= delta;
            let column = (self.cart_gradient(&to_coords3d(&plus))
                - self.cart_gradient(&to_coords3d(&minus)))
                / (2.0 * delta);
            hess.set_column(j, &column);
        }
        (&hess + hess.transpose()) * 0.5
    }
}

#[test]
fn transformed_findiff_hessian_recovers_force_constants() {
    let rc = coords_for(WATER);
    let prims = rc.typed_prims().to_vec();
    let q = rc.prim_values();
    let model = QuadraticModel {
        prims,
        k: vec![0.5, 0.45, 0.16],
        q0: vec![q[0] - 0.05, q[1] + 0.03, q[2] - 0.1],
    };

    let cart_grad = model.cart_gradient(rc.coords3d());
    let int_grad = rc.transform_gradient(&cart_grad).unwrap();
    let expected_grad = DVector::from_vec(vec![0.5 * 0.05, -0.45 * 0.03, 0.16 * 0.1]);
    assert!((&int_grad - expected_grad).amax() < 1e-10);

    let cart_hessian = model.numerical_hessian(rc.coords3d(), 1e-4);
    let h_int = rc.transform_hessian(&cart_hessian, &int_grad).unwrap();
    let expected = DMatrix::from_diagonal(&DVector::from_vec(model.k.clone()));
    assert!((h_int - expected).amax() < 1e-6);

    // without the curvature correction the result is visibly off
    let b_inv = rc.b_inv();
    let uncorrected = b_inv.transpose() * &cart_hessian * b_inv;
    let expected = DMatrix::from_diagonal(&DVector::from_vec(model.k.clone()));
    assert!((uncorrected - expected).amax() > 1e-3);
}

#[test]
fn stretched_water_drops_nothing_and_updates_b() {
    let mut rc = coords_for(WATER);
    let before = rc.b_matrix().clone();
    let moved: Vec<Vector3<f64>> = rc
        .coords3d()
        .iter()
        .enumerate()
        .map(|(i, c)| if i == 1 { c * 1.1 } else { *c })
        .collect();
    assert!(rc.prims_valid_at(&moved));
    rc.set_coords(moved).unwrap();
    assert!((rc.b_matrix() - before).amax() > 1e-3);
}
