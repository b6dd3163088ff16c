//! Cartesian geometries from Z-matrix strings.
//!
//! Accepted lines (1-based references, Angstrom and degrees):
//!
//! ```text
//! O
//! O 1 1.5
//! H 1 1.07 2 109.5
//! H 2 1.07 1 109.5 3 180.
//! ```

use crate::constants::ANG2BOHR;
use crate::error::{IntCoordError, Result};
use nalgebra::Vector3;

/// Atoms and Cartesian coordinates (Bohr) built from a Z-matrix.
#[derive(Debug, Clone)]
pub struct ZmatGeometry {
    pub atoms: Vec<String>,
    pub coords3d: Vec<Vector3<f64>>,
}

/// Position of atom D bonded to C, with angle B-C-D and torsion A-B-C-D
/// (natural extension reference frame). Angles in radians.
pub fn place_atom(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    bond: f64,
    angle: f64,
    torsion: f64,
) -> Vector3<f64> {
    let ab = b - a;
    let bcn = (c - b).normalize();
    let n = ab.cross(&bcn).try_normalize(1e-10).unwrap_or_else(|| {
        let helper = if bcn.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        helper.cross(&bcn).normalize()
    });
    let nbc = n.cross(&bcn);
    let local = Vector3::new(
        -bond * angle.cos(),
        bond * torsion.cos() * angle.sin(),
        bond * torsion.sin() * angle.sin(),
    );
    c + bcn * local.x + nbc * local.y + n * local.z
}

pub fn geom_from_zmat_str(text: &str) -> Result<ZmatGeometry> {
    let mut atoms = Vec::new();
    let mut coords3d: Vec<Vector3<f64>> = Vec::new();

    for (lineno, raw) in text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
        if raw.is_empty() {
            continue;
        }
        let fields: Vec<&str> = raw.split_whitespace().collect();
        let current = coords3d.len();
        let expected = 1 + 2 * current.min(3);
        if fields.len() != expected {
            return Err(IntCoordError::ZMatrix {
                line: lineno,
                message: format!("expected {} fields for atom {}, got {}", expected, current + 1, fields.len()),
            });
        }

        let refs = |k: usize| -> Result<usize> { parse_ref(fields[1 + 2 * k], current, lineno) };
        let num = |k: usize| -> Result<f64> { parse_num(fields[2 + 2 * k], lineno) };

        let position = match current {
            0 => Vector3::zeros(),
            1 => {
                let i = refs(0)?;
                coords3d[i] + Vector3::new(0.0, 0.0, num(0)? * ANG2BOHR)
            }
            2 => {
                let (i, j) = (refs(0)?, refs(1)?);
                distinct(&[i, j], lineno)?;
                let c = coords3d[i];
                let b = coords3d[j];
                let a = b + Vector3::x();
                place_atom(&a, &b, &c, num(0)? * ANG2BOHR, num(1)?.to_radians(), 0.0)
            }
            _ => {
                let (i, j, k) = (refs(0)?, refs(1)?, refs(2)?);
                distinct(&[i, j, k], lineno)?;
                place_atom(
                    &coords3d[k],
                    &coords3d[j],
                    &coords3d[i],
                    num(0)? * ANG2BOHR,
                    num(1)?.to_radians(),
                    num(2)?.to_radians(),
                )
            }
        };
        atoms.push(fields[0].to_string());
        coords3d.push(position);
    }

    Ok(ZmatGeometry { atoms, coords3d })
}

fn parse_ref(field: &str, current: usize, line: usize) -> Result<usize> {
    let index: usize = field.parse().map_err(|_| IntCoordError::ZMatrix {
        line,
        message: format!("invalid atom reference '{}'", field),
    })?;
    if index == 0 || index > current {
        return Err(IntCoordError::ZMatrix {
            line,
            message: format!("reference {} must point to one of the previous {} atoms", index, current),
        });
    }
    Ok(index - 1)
}

fn parse_num(field: &str, line: usize) -> Result<f64> {
    field.parse().map_err(|_| IntCoordError::ZMatrix {
        line,
        message: format!("invalid number '{}'", field),
    })
}

fn distinct(refs: &[usize], line: usize) -> Result<()> {
    for (n, r) in refs.iter().enumerate() {
        if refs[..n].contains(r) {
            return Err(IntCoordError::ZMatrix {
                line,
                message: format!("atom {} referenced twice", r + 1),
            });
        }
    }
    Ok(())
}
