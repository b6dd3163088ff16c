use thiserror::Error;

/// Errors raised while building or using a redundant internal coordinate system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntCoordError {
    #[error("Underdetermined coordinate system: B-matrix rank {rank}, but {required} internal degrees of freedom are required")]
    Underdetermined { rank: usize, required: usize },

    #[error("Primitive references atom {index}, but the geometry only has {natoms} atoms")]
    InvalidAtomIndex { index: usize, natoms: usize },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Analytic and numerical {quantity} of {primitive} disagree: max deviation {max_deviation:.3e} exceeds tolerance")]
    ComparisonMismatch {
        quantity: &'static str,
        primitive: String,
        max_deviation: f64,
    },

    #[error("Unknown element symbol: {0:?}")]
    UnknownElement(String),

    #[error("No {property} tabulated for {symbol}")]
    MissingElementData {
        symbol: String,
        property: &'static str,
    },

    #[error("Linear algebra failure: {0}")]
    Linalg(String),

    #[error("Z-matrix line {line}: {message}")]
    ZMatrix { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, IntCoordError>;
