//! Connectivity analysis and enumeration of the redundant primitive set.

use crate::constants::ANG2BOHR;
use crate::elements::covalent_radius;
use crate::error::Result;
use crate::primitives::Primitive;
use itertools::Itertools;
use nalgebra::Vector3;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use tracing::debug;

/// Two atoms are bonded when closer than this factor times the sum of their
/// covalent radii.
pub const BOND_FACTOR: f64 = 1.3;

/// Bonded atom graph of a molecule. Node `i` is atom `i`.
pub struct BondGraph {
    graph: UnGraph<(), ()>,
}

impl BondGraph {
    pub fn new(natoms: usize, bonds: &[[usize; 2]]) -> Self {
        let mut graph = UnGraph::with_capacity(natoms, bonds.len());
        for _ in 0..natoms {
            graph.add_node(());
        }
        graph.extend_with_edges(bonds.iter().map(|&[a, b]| (a as u32, b as u32)));
        BondGraph { graph }
    }

    /// Sorted bonded neighbours of `atom`.
    pub fn neighbors(&self, atom: usize) -> Vec<usize> {
        self.graph
            .neighbors(NodeIndex::new(atom))
            .map(|n| n.index())
            .sorted()
            .dedup()
            .collect()
    }

    pub fn bonds(&self) -> Vec<[usize; 2]> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| {
                let (a, b) = (a.index(), b.index());
                [a.min(b), a.max(b)]
            })
            .collect()
    }

    /// Connected components, each sorted, ordered by their smallest atom.
    pub fn fragments(&self) -> Vec<Vec<usize>> {
        let natoms = self.graph.node_count();
        let mut uf = UnionFind::new(natoms);
        for [a, b] in self.bonds() {
            uf.union(a, b);
        }
        let labels = uf.into_labeling();
        (0..natoms)
            .into_group_map_by(|&atom| labels[atom])
            .into_values()
            .map(|mut frag| {
                frag.sort_unstable();
                frag
            })
            .sorted_by_key(|frag| frag[0])
            .collect()
    }
}

/// Covalent bonds from interatomic distances. Coordinates are in Bohr.
pub fn covalent_bonds(
    atoms: &[String],
    coords3d: &[Vector3<f64>],
    factor: f64,
) -> Result<Vec<[usize; 2]>> {
    let radii = atoms
        .iter()
        .map(|a| covalent_radius(a).map(|r| r * ANG2BOHR))
        .collect::<Result<Vec<f64>>>()?;
    Ok((0..coords3d.len())
        .tuple_combinations()
        .filter(|&(i, j)| (coords3d[i] - coords3d[j]).norm() <= factor * (radii[i] + radii[j]))
        .map(|(i, j)| [i, j])
        .collect())
}

/// Bonds that join disconnected fragments into one graph. Fragment pairs are
/// merged closest first, each through its shortest atom-atom contact.
pub fn interfragment_bonds(coords3d: &[Vector3<f64>], fragments: &[Vec<usize>]) -> Vec<[usize; 2]> {
    if fragments.len() < 2 {
        return Vec::new();
    }
    let contacts = fragments
        .iter()
        .enumerate()
        .tuple_combinations()
        .flat_map(|((fi, frag_i), (fj, frag_j))| {
            frag_i
                .iter()
                .cartesian_product(frag_j.iter())
                .map(move |(&a, &b)| (fi, fj, a, b))
        })
        .map(|(fi, fj, a, b)| ((coords3d[a] - coords3d[b]).norm(), fi, fj, a, b))
        .sorted_by(|x, y| x.0.total_cmp(&y.0));

    let mut uf = UnionFind::new(fragments.len());
    let mut bonds = Vec::with_capacity(fragments.len() - 1);
    for (dist, fi, fj, a, b) in contacts {
        if uf.union(fi, fj) {
            debug!("Interfragment bond {}-{} ({:.4} bohr)", a, b, dist);
            bonds.push([a.min(b), a.max(b)]);
            if bonds.len() == fragments.len() - 1 {
                break;
            }
        }
    }
    bonds
}

/// Every pair of bonded neighbours around each apex atom.
pub fn bends(graph: &BondGraph, natoms: usize) -> Vec<[usize; 3]> {
    (0..natoms)
        .flat_map(|o| {
            graph
                .neighbors(o)
                .into_iter()
                .tuple_combinations()
                .map(move |(m, n)| [m, o, n])
        })
        .collect()
}

/// Proper dihedrals m-o-p-n along every bond o-p.
pub fn proper_dihedrals(graph: &BondGraph) -> Vec<[usize; 4]> {
    let mut dihedrals = Vec::new();
    for [o, p] in graph.bonds().into_iter().sorted() {
        for m in graph.neighbors(o).into_iter().filter(|&m| m != p) {
            for n in graph.neighbors(p).into_iter().filter(|&n| n != o && n != m) {
                dihedrals.push([m, o, p, n]);
            }
        }
    }
    dihedrals
}

/// Bends wider than `lb_min_deg` become a linear bend pair.
fn bend_prims(coords3d: &[Vector3<f64>], bend: [usize; 3], lb_min_deg: f64) -> Vec<Primitive> {
    let deg = Primitive::Bend(bend).value(coords3d).to_degrees();
    if deg > lb_min_deg {
        debug!("Bend {:?} at {:.2} deg treated as linear", bend, deg);
        vec![Primitive::LinearBend(bend), Primitive::LinearBendComplement(bend)]
    } else {
        vec![Primitive::Bend(bend)]
    }
}

/// Redundant primitive set for a molecule: bonds (including interfragment
/// bonds), then bends and linear bends, then proper dihedrals, without
/// duplicates.
pub fn setup_primitives(
    atoms: &[String],
    coords3d: &[Vector3<f64>],
    lb_min_deg: f64,
) -> Result<Vec<Primitive>> {
    let natoms = coords3d.len();
    let mut bonds = covalent_bonds(atoms, coords3d, BOND_FACTOR)?;
    let fragments = BondGraph::new(natoms, &bonds).fragments();
    if fragments.len() > 1 {
        debug!("Found {} fragments", fragments.len());
        bonds.extend(interfragment_bonds(coords3d, &fragments));
    }
    let graph = BondGraph::new(natoms, &bonds);

    let stretches = graph.bonds().into_iter().sorted().map(Primitive::Stretch);
    let bends = bends(&graph, natoms)
        .into_iter()
        .flat_map(|bend| bend_prims(coords3d, bend, lb_min_deg));
    let dihedrals = proper_dihedrals(&graph).into_iter().map(Primitive::ProperDihedral);
    Ok(stretches.chain(bends).chain(dihedrals).unique().collect())
}
