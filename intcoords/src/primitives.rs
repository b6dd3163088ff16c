//! Primitive internal coordinates.
//!
//! Every primitive is a function of a few "legs", difference vectors between
//! two atoms. Derivatives are first formed with respect to the legs and then
//! scattered onto the Cartesian coordinates of the atoms at both ends, which
//! keeps the closed-form expressions small.
//!
//! Ordinary bends lose their derivatives at 180 degrees. Near-linear
//! arrangements are described by a pair of linear bends instead, which
//! project the sum of the two unit bond vectors onto two Cartesian axes
//! perpendicular to the molecular axis. Both stay smooth through linearity.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind tag of a primitive internal coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimType {
    Stretch,
    Bend,
    LinearBend,
    LinearBendComplement,
    ProperDihedral,
}

impl fmt::Display for PrimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimType::Stretch => "stretch",
            PrimType::Bend => "bend",
            PrimType::LinearBend => "linear bend",
            PrimType::LinearBendComplement => "linear bend complement",
            PrimType::ProperDihedral => "proper dihedral",
        };
        write!(f, "{}", name)
    }
}

/// A typed primitive internal coordinate.
///
/// Atom order matters for the value of a dihedral (its sign) but a primitive
/// and its reversed tuple describe the same measurement, so equality and
/// hashing use the canonical orientation.
///
/// - `Stretch([a, b])`: distance between `a` and `b`.
/// - `Bend([m, o, n])`: angle m-o-n with `o` at the apex.
/// - `LinearBend([m, o, n])` and `LinearBendComplement([m, o, n])`: the two
///   bending components of a near-linear m-o-n, see [`linear_bend_axis`].
/// - `ProperDihedral([m, o, p, n])`: torsion around the o-p bond.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind", content = "atoms", rename_all = "snake_case")]
pub enum Primitive {
    Stretch([usize; 2]),
    Bend([usize; 3]),
    LinearBend([usize; 3]),
    LinearBendComplement([usize; 3]),
    ProperDihedral([usize; 4]),
}

impl Primitive {
    pub fn kind(&self) -> PrimType {
        match self {
            Primitive::Stretch(_) => PrimType::Stretch,
            Primitive::Bend(_) => PrimType::Bend,
            Primitive::LinearBend(_) => PrimType::LinearBend,
            Primitive::LinearBendComplement(_) => PrimType::LinearBendComplement,
            Primitive::ProperDihedral(_) => PrimType::ProperDihedral,
        }
    }

    pub fn atoms(&self) -> &[usize] {
        match self {
            Primitive::Stretch(inds) => inds,
            Primitive::Bend(inds)
            | Primitive::LinearBend(inds)
            | Primitive::LinearBendComplement(inds) => inds,
            Primitive::ProperDihedral(inds) => inds,
        }
    }

    /// Same primitive with the atom tuple oriented so that the first index is
    /// not larger than the last one.
    pub fn canonical(&self) -> Primitive {
        let mut prim = *self;
        let reverse = {
            let atoms = prim.atoms();
            let (first, last) = (atoms[0], atoms[atoms.len() - 1]);
            first > last || (first == last && atoms.len() == 4 && atoms[1] > atoms[2])
        };
        if reverse {
            match &mut prim {
                Primitive::Stretch(inds) => inds.reverse(),
                Primitive::Bend(inds)
                | Primitive::LinearBend(inds)
                | Primitive::LinearBendComplement(inds) => inds.reverse(),
                Primitive::ProperDihedral(inds) => inds.reverse(),
            }
        }
        prim
    }

    /// Bond length in Bohr, or an angle in radians. Dihedrals lie in (-pi, pi].
    /// Linear bends are dimensionless and vanish for a linear arrangement;
    /// for small deviations they approximate the bending angle in radians.
    pub fn value(&self, coords3d: &[Vector3<f64>]) -> f64 {
        match *self {
            Primitive::Stretch([a, b]) => (coords3d[a] - coords3d[b]).norm(),
            Primitive::Bend([m, o, n]) => {
                let u = coords3d[m] - coords3d[o];
                let v = coords3d[n] - coords3d[o];
                u.cross(&v).norm().atan2(u.dot(&v))
            }
            Primitive::LinearBend(inds) | Primitive::LinearBendComplement(inds) => {
                let [m, o, n] = inds;
                let axis = linear_bend_axis(coords3d, inds, self.is_complement());
                let u = (coords3d[m] - coords3d[o]).normalize();
                let v = (coords3d[n] - coords3d[o]).normalize();
                axis.dot(&(u + v))
            }
            Primitive::ProperDihedral([m, o, p, n]) => {
                let b1 = coords3d[o] - coords3d[m];
                let b2 = coords3d[p] - coords3d[o];
                let b3 = coords3d[n] - coords3d[p];
                let x = b1.dot(&b2) * b2.dot(&b3) - b1.dot(&b3) * b2.dot(&b2);
                let y = b2.norm() * b1.dot(&b2.cross(&b3));
                y.atan2(x)
            }
        }
    }

    /// Row of the Wilson B-matrix: dq/dx over all 3N Cartesian coordinates.
    pub fn gradient(&self, coords3d: &[Vector3<f64>]) -> DVector<f64> {
        let legs = self.legs();
        let (grad, _) = self.leg_derivatives(coords3d, false);
        let mut out = DVector::zeros(3 * coords3d.len());
        for (k, &(to, from)) in legs.iter().enumerate() {
            for i in 0..3 {
                out[3 * to + i] += grad[3 * k + i];
                out[3 * from + i] -= grad[3 * k + i];
            }
        }
        out
    }

    /// Full 3N x 3N matrix of second derivatives d2q/dx2.
    pub fn second_derivative(&self, coords3d: &[Vector3<f64>]) -> DMatrix<f64> {
        let n = 3 * coords3d.len();
        let mut out = DMatrix::zeros(n, n);
        self.accumulate_second_derivative(coords3d, 1.0, &mut out);
        out
    }

    /// Adds `weight * d2q/dx2` to `target`, which must be 3N x 3N.
    pub fn accumulate_second_derivative(
        &self,
        coords3d: &[Vector3<f64>],
        weight: f64,
        target: &mut DMatrix<f64>,
    ) {
        let legs = self.legs();
        let (_, hess) = self.leg_derivatives(coords3d, true);
        for (k, &(to_k, from_k)) in legs.iter().enumerate() {
            for (l, &(to_l, from_l)) in legs.iter().enumerate() {
                for (a, sa) in [(to_k, 1.0), (from_k, -1.0)] {
                    for (b, sb) in [(to_l, 1.0), (from_l, -1.0)] {
                        let scale = weight * sa * sb;
                        for i in 0..3 {
                            for j in 0..3 {
                                target[(3 * a + i, 3 * b + j)] +=
                                    scale * hess[(3 * k + i, 3 * l + j)];
                            }
                        }
                    }
                }
            }
        }
    }

    /// Second derivatives restricted to the primitive's own atoms, in the
    /// order of `atoms()`: a 3k x 3k matrix.
    pub fn local_second_derivative(&self, coords3d: &[Vector3<f64>]) -> DMatrix<f64> {
        let full = self.second_derivative(coords3d);
        let atoms = self.atoms();
        let k = 3 * atoms.len();
        DMatrix::from_fn(k, k, |r, c| {
            full[(3 * atoms[r / 3] + r % 3, 3 * atoms[c / 3] + c % 3)]
        })
    }

    fn is_complement(&self) -> bool {
        matches!(self, Primitive::LinearBendComplement(_))
    }

    /// Difference vectors as (to, from) atom pairs.
    fn legs(&self) -> Vec<(usize, usize)> {
        match *self {
            Primitive::Stretch([a, b]) => vec![(a, b)],
            Primitive::Bend([m, o, n])
            | Primitive::LinearBend([m, o, n])
            | Primitive::LinearBendComplement([m, o, n]) => vec![(m, o), (n, o)],
            Primitive::ProperDihedral([m, o, p, n]) => vec![(o, m), (p, o), (n, p)],
        }
    }

    /// Gradient and (optionally) Hessian of the primitive with respect to
    /// its legs.
    fn leg_derivatives(
        &self,
        coords3d: &[Vector3<f64>],
        with_hessian: bool,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let legs: Vec<Vector3<f64>> = self
            .legs()
            .iter()
            .map(|&(to, from)| coords3d[to] - coords3d[from])
            .collect();
        match (*self, legs.as_slice()) {
            (Primitive::Stretch(_), [u]) => stretch_derivatives(u, with_hessian),
            (Primitive::Bend(_), [u, v]) => bend_derivatives(u, v, with_hessian),
            (
                Primitive::LinearBend(inds) | Primitive::LinearBendComplement(inds),
                [u, v],
            ) => {
                let axis = linear_bend_axis(coords3d, inds, self.is_complement());
                linear_bend_derivatives(u, v, &axis, with_hessian)
            }
            (Primitive::ProperDihedral(_), [b1, b2, b3]) => {
                dihedral_derivatives(b1, b2, b3, with_hessian)
            }
            _ => unreachable!("leg count follows the primitive kind"),
        }
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.canonical(), other.canonical());
        a.kind() == b.kind() && a.atoms() == b.atoms()
    }
}

impl Eq for Primitive {}

impl Hash for Primitive {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let canonical = self.canonical();
        canonical.kind().hash(state);
        canonical.atoms().hash(state);
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let atoms: Vec<String> = self.atoms().iter().map(|i| i.to_string()).collect();
        write!(f, "{}({})", self.kind(), atoms.join(", "))
    }
}

fn set_block(target: &mut DMatrix<f64>, k: usize, l: usize, block: &Matrix3<f64>) {
    target.fixed_view_mut::<3, 3>(3 * k, 3 * l).copy_from(block);
}

fn stacked(parts: &[Vector3<f64>]) -> DVector<f64> {
    DVector::from_iterator(3 * parts.len(), parts.iter().flat_map(|v| v.iter().copied()))
}

fn stretch_derivatives(u: &Vector3<f64>, with_hessian: bool) -> (DVector<f64>, DMatrix<f64>) {
    let r = u.norm();
    let e = u / r;
    let mut hess = DMatrix::zeros(3, 3);
    if with_hessian {
        let block = (Matrix3::identity() - e * e.transpose()) / r;
        set_block(&mut hess, 0, 0, &block);
    }
    (stacked(&[e]), hess)
}

/// Derivatives of the angle between legs `u` and `v`, via its cosine.
fn bend_derivatives(
    u: &Vector3<f64>,
    v: &Vector3<f64>,
    with_hessian: bool,
) -> (DVector<f64>, DMatrix<f64>) {
    let a = 1.0 / u.norm();
    let b = 1.0 / v.norm();
    let c = (u.dot(v) * a * b).clamp(-1.0, 1.0);
    let s = (1.0 - c * c).sqrt();

    let gc_u = a * b * v - c * a * a * u;
    let gc_v = a * b * u - c * b * b * v;
    let gc = stacked(&[gc_u, gc_v]);
    let grad = -&gc / s;

    let mut hess = DMatrix::zeros(6, 6);
    if with_hessian {
        let id = Matrix3::identity();
        let uu = u * u.transpose();
        let vv = v * v.transpose();
        let uv = u * v.transpose();
        let vu = v * u.transpose();
        let h_uu = -a.powi(3) * b * (vu + uv) + 3.0 * c * a.powi(4) * uu - c * a * a * id;
        let h_vv = -a * b.powi(3) * (uv + vu) + 3.0 * c * b.powi(4) * vv - c * b * b * id;
        let h_uv = a * b * id - a * b.powi(3) * vv - a.powi(3) * b * uu + c * a * a * b * b * uv;

        let mut hc = DMatrix::zeros(6, 6);
        set_block(&mut hc, 0, 0, &h_uu);
        set_block(&mut hc, 0, 1, &h_uv);
        set_block(&mut hc, 1, 0, &h_uv.transpose());
        set_block(&mut hc, 1, 1, &h_vv);

        hess = -hc / s - (c / s.powi(3)) * &gc * gc.transpose();
    }
    (grad, hess)
}

/// Reference axis of a linear bend m-o-n: of the two Cartesian axes least
/// parallel to the m-n line, the first one for the linear bend and the
/// second one for its complement.
///
/// The axes only change where the largest component of the m-n line ties
/// with another one, so derivatives hold everywhere else.
pub fn linear_bend_axis(
    coords3d: &[Vector3<f64>],
    [m, _, n]: [usize; 3],
    complement: bool,
) -> Vector3<f64> {
    let line = coords3d[n] - coords3d[m];
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| line[a].abs().total_cmp(&line[b].abs()).then(a.cmp(&b)));
    let (first, second) = (order[0].min(order[1]), order[0].max(order[1]));
    let mut axis = Vector3::zeros();
    axis[if complement { second } else { first }] = 1.0;
    axis
}

/// Derivatives of `w.(u/|u| + v/|v|)` with respect to the legs `u` and `v`.
/// The two legs do not couple, so the off-diagonal blocks vanish.
fn linear_bend_derivatives(
    u: &Vector3<f64>,
    v: &Vector3<f64>,
    w: &Vector3<f64>,
    with_hessian: bool,
) -> (DVector<f64>, DMatrix<f64>) {
    let id = Matrix3::identity();
    let unit_grad = |leg: &Vector3<f64>| {
        let r = leg.norm();
        let e = leg / r;
        (w - e * e.dot(w)) / r
    };
    let unit_hess = |leg: &Vector3<f64>| {
        let r = leg.norm();
        let e = leg / r;
        let ew = e.dot(w);
        -(w * e.transpose() + e * w.transpose() + ew * (id - 3.0 * e * e.transpose())) / (r * r)
    };

    let grad = stacked(&[unit_grad(u), unit_grad(v)]);
    let mut hess = DMatrix::zeros(6, 6);
    if with_hessian {
        set_block(&mut hess, 0, 0, &unit_hess(u));
        set_block(&mut hess, 1, 1, &unit_hess(v));
    }
    (grad, hess)
}

/// Derivatives of the torsion `atan2(|b2| b1.(b2 x b3), (b1 x b2).(b2 x b3))`.
fn dihedral_derivatives(
    b1: &Vector3<f64>,
    b2: &Vector3<f64>,
    b3: &Vector3<f64>,
    with_hessian: bool,
) -> (DVector<f64>, DMatrix<f64>) {
    let d12 = b1.dot(b2);
    let d13 = b1.dot(b3);
    let d23 = b2.dot(b3);
    let d22 = b2.dot(b2);
    let len = d22.sqrt();
    let e2 = b2 / len;
    let triple = b1.dot(&b2.cross(b3));

    let x = d12 * d23 - d13 * d22;
    let y = len * triple;
    let rho = x * x + y * y;

    let gx = stacked(&[
        b2 * d23 - b3 * d22,
        b1 * d23 + b3 * d12 - 2.0 * d13 * b2,
        b2 * d12 - b1 * d22,
    ]);
    let gt = stacked(&[b2.cross(b3), b3.cross(b1), b1.cross(b2)]);
    let ge = stacked(&[Vector3::zeros(), e2, Vector3::zeros()]);
    let gy = len * &gt + triple * &ge;

    let numerator = x * &gy - y * &gx;
    let grad = &numerator / rho;

    let mut hess = DMatrix::zeros(9, 9);
    if with_hessian {
        let id = Matrix3::identity();

        let mut hx = DMatrix::zeros(9, 9);
        let hx12 = d23 * id + b2 * b3.transpose() - 2.0 * b3 * b2.transpose();
        let hx13 = b2 * b2.transpose() - d22 * id;
        let hx22 = b1 * b3.transpose() + b3 * b1.transpose() - 2.0 * d13 * id;
        let hx23 = b1 * b2.transpose() + d12 * id - 2.0 * b2 * b1.transpose();
        set_block(&mut hx, 0, 1, &hx12);
        set_block(&mut hx, 1, 0, &hx12.transpose());
        set_block(&mut hx, 0, 2, &hx13);
        set_block(&mut hx, 2, 0, &hx13.transpose());
        set_block(&mut hx, 1, 1, &hx22);
        set_block(&mut hx, 1, 2, &hx23);
        set_block(&mut hx, 2, 1, &hx23.transpose());

        let mut ht = DMatrix::zeros(9, 9);
        let ht12 = -b3.cross_matrix();
        let ht13 = b2.cross_matrix();
        let ht23 = -b1.cross_matrix();
        set_block(&mut ht, 0, 1, &ht12);
        set_block(&mut ht, 1, 0, &ht12.transpose());
        set_block(&mut ht, 0, 2, &ht13);
        set_block(&mut ht, 2, 0, &ht13.transpose());
        set_block(&mut ht, 1, 2, &ht23);
        set_block(&mut ht, 2, 1, &ht23.transpose());

        let mut hl = DMatrix::zeros(9, 9);
        set_block(&mut hl, 1, 1, &((id - e2 * e2.transpose()) / len));

        let hy = len * ht + &gt * ge.transpose() + &ge * gt.transpose() + triple * hl;

        let dn = x * &hy - y * &hx + &gy * gx.transpose() - &gx * gy.transpose();
        let drho = 2.0 * (x * &gx + y * &gy);
        let full = dn / rho - &numerator * drho.transpose() / (rho * rho);
        hess = (&full + full.transpose()) * 0.5;
    }
    (grad, hess)
}
