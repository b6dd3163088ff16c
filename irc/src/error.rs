use intcoords::IntCoordError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrcError {
    #[error("Invalid IRC configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Coordinates(#[from] IntCoordError),

    #[error("Coordinate provider failed: {0}")]
    Provider(String),

    #[error("Smallest Hessian eigenvalue {0:.3e} is numerically zero, the initial step is undefined")]
    FlatTransitionMode(f64),

    #[error("Gradient norm {gradient_norm:.3e} is too small to define a descent direction")]
    StationaryPoint { gradient_norm: f64 },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Output failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for IrcError {
    fn from(err: std::io::Error) -> Self {
        IrcError::Io(err.to_string())
    }
}

pub type IrcResult<T> = Result<T, IrcError>;
