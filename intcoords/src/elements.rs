//! Element data used to derive connectivity and mass weighting.

use crate::error::{IntCoordError, Result};
use periodic_table_on_an_enum::{periodic_table, Element};

/// Single-bond covalent radii in Angstrom for H through Rn, indexed by
/// atomic number minus one (Cordero et al., 2008; low-spin values for the
/// 3d metals).
const COVALENT_RADII: [f64; 86] = [
    0.31, 0.28, // H, He
    1.28, 0.96, 0.84, 0.76, 0.71, 0.66, 0.57, 0.58, // Li - Ne
    1.66, 1.41, 1.21, 1.11, 1.07, 1.05, 1.02, 1.06, // Na - Ar
    2.03, 1.76, 1.70, 1.60, 1.53, 1.39, 1.39, 1.32, 1.26, 1.24, 1.32, 1.22, // K - Zn
    1.22, 1.20, 1.19, 1.20, 1.20, 1.16, // Ga - Kr
    2.20, 1.95, 1.90, 1.75, 1.64, 1.54, 1.47, 1.46, 1.42, 1.39, 1.45, 1.44, // Rb - Cd
    1.42, 1.39, 1.39, 1.38, 1.39, 1.40, // In - Xe
    2.44, 2.15, // Cs, Ba
    2.07, 2.04, 2.03, 2.01, 1.99, 1.98, 1.98, 1.96, 1.94, 1.92, 1.92, 1.89, 1.90, 1.87, 1.87, // La - Lu
    1.75, 1.70, 1.62, 1.51, 1.44, 1.41, 1.36, 1.36, 1.32, // Hf - Hg
    1.45, 1.46, 1.48, 1.40, 1.50, 1.50, // Tl - Rn
];

/// Parse an element symbol. Surrounding whitespace and letter case are
/// ignored, so "cl", "CL" and " Cl" all give chlorine.
pub fn element(symbol: &str) -> Result<Element> {
    let trimmed = symbol.trim();
    periodic_table()
        .find(|e| e.get_symbol().eq_ignore_ascii_case(trimmed))
        .ok_or_else(|| IntCoordError::UnknownElement(symbol.to_string()))
}

/// Covalent radius of an element in Angstrom.
pub fn covalent_radius(symbol: &str) -> Result<f64> {
    let element = element(symbol)?;
    COVALENT_RADII
        .get(element.get_atomic_number() - 1)
        .copied()
        .ok_or_else(|| IntCoordError::MissingElementData {
            symbol: element.get_symbol().to_string(),
            property: "covalent radius",
        })
}

/// Standard atomic mass in amu.
pub fn atomic_mass(symbol: &str) -> Result<f64> {
    Ok(element(symbol)?.get_atomic_mass() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(covalent_radius("cl").unwrap(), covalent_radius("Cl").unwrap());
        assert_eq!(covalent_radius("CL").unwrap(), 1.02);
        assert!((atomic_mass(" o ").unwrap() - 15.999).abs() < 1e-4);
    }

    #[test]
    fn masses_cover_the_whole_table() {
        for (symbol, mass) in [("Se", 78.97), ("Ti", 47.867), ("Xe", 131.29), ("Au", 196.967)] {
            let found = atomic_mass(symbol).unwrap();
            assert!((found - mass).abs() < 0.01, "{}: {}", symbol, found);
        }
        assert_eq!(covalent_radius("Se").unwrap(), 1.20);
        assert_eq!(covalent_radius("Rn").unwrap(), 1.50);
    }

    #[test]
    fn unknown_elements_are_errors() {
        assert_eq!(
            atomic_mass("Xx"),
            Err(IntCoordError::UnknownElement("Xx".to_string()))
        );
        assert!(matches!(covalent_radius(""), Err(IntCoordError::UnknownElement(_))));
        assert!(matches!(element("A"), Err(IntCoordError::UnknownElement(_))));
        assert!(matches!(
            covalent_radius("U"),
            Err(IntCoordError::MissingElementData { property: "covalent radius", .. })
        ));
    }
}
