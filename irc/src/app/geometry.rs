use crate::config::{Config, Units};
use color_eyre::eyre::{bail, Result, WrapErr};
use intcoords::constants::ANG2BOHR;
use intcoords::elements::element;
use intcoords::zmat::geom_from_zmat_str;
use nalgebra::Vector3;
use tracing::info;

/// Atom symbols and Cartesian coordinates in Bohr.
pub struct Geometry {
    pub atoms: Vec<String>,
    pub coords3d: Vec<Vector3<f64>>,
}

/// Build the transition-state geometry from either the explicit atom list or
/// the Z-matrix of the configuration.
pub fn build_geometry(config: &Config) -> Result<Geometry> {
    info!("Preparing geometry...");

    let geometry = match (&config.zmat, config.geometry.is_empty()) {
        (Some(_), false) => bail!("Specify either `geometry` or `zmat`, not both"),
        (Some(zmat), true) => {
            let parsed = geom_from_zmat_str(zmat).wrap_err("Invalid Z-matrix")?;
            let atoms = parsed
                .atoms
                .iter()
                .map(|symbol| checked_symbol(symbol))
                .collect::<Result<Vec<_>>>()?;
            Geometry {
                atoms,
                coords3d: parsed.coords3d,
            }
        }
        (None, false) => {
            let scale = match config.units.unwrap_or_default() {
                Units::Angstrom => ANG2BOHR,
                Units::Bohr => 1.0,
            };
            let mut atoms = Vec::with_capacity(config.geometry.len());
            let mut coords3d = Vec::with_capacity(config.geometry.len());
            for atom in &config.geometry {
                atoms.push(checked_symbol(&atom.element)?);
                coords3d.push(Vector3::from(atom.coords) * scale);
            }
            Geometry { atoms, coords3d }
        }
        (None, true) => bail!("The configuration contains no atoms"),
    };

    info!("Geometry with {} atoms (Bohr):", geometry.atoms.len());
    for (symbol, c) in geometry.atoms.iter().zip(&geometry.coords3d) {
        info!("  {:<2} {:>12.6} {:>12.6} {:>12.6}", symbol, c.x, c.y, c.z);
    }
    Ok(geometry)
}

fn checked_symbol(symbol: &str) -> Result<String> {
    let parsed = element(symbol).wrap_err("Invalid geometry")?;
    Ok(parsed.get_symbol().to_string())
}
