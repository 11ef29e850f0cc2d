use thiserror::Error;

/// Main error type for the ModelSweep system
#[derive(Error, Debug)]
pub enum MsError {
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Search protocol errors.
///
/// These are precondition failures: a caller that follows the
/// request/feedback protocol never sees them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Generator exhausted: {generator} has no further configurations")]
    GeneratorExhausted { generator: String },

    #[error("No unvisited adjacent neighbor around home {home}")]
    NoUnvisitedNeighbor { home: String },

    #[error("Home coordinate {home} has not been measured yet")]
    HomeNotMeasured { home: String },

    #[error("Unexpected feedback for {generator}: {message}")]
    UnexpectedFeedback { generator: String, message: String },

    #[error("Dimension mismatch: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Coordinate {coordinate} is outside the bounds of dimension {dimension}")]
    OutOfBounds { coordinate: String, dimension: usize },
}

/// Result type alias for ModelSweep operations
pub type MsResult<T> = Result<T, MsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::MsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MsError::Config(format!($($arg)*))
    };
}
