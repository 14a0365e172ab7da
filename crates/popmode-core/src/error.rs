//! Error types for population construction and decoding.

use thiserror::Error;

/// Population construction and decoding error types
#[derive(Error, Debug)]
pub enum PopulationError {
    /// Population declared with no representational radii
    #[error("Population has no representational radii")]
    EmptyRadii,

    /// Population has no decoded origins
    #[error("Population has no decoded origins")]
    NoOrigins,

    /// State or activity dimension does not match the population
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimensionality
        expected: usize,
        /// Received dimensionality
        got: usize,
    },

    /// Invalid construction parameter
    #[error("Invalid population parameter {parameter}: {reason}")]
    InvalidParameter {
        /// Parameter name
        parameter: &'static str,
        /// Reason the value was rejected
        reason: String,
    },

    /// Decoder solve failed for an origin
    #[error("Failed to solve decoders for origin {origin}: singular Gram matrix")]
    DecoderSolve {
        /// Origin name
        origin: String,
    },
}

/// Result type for population operations
pub type PopulationResult<T> = Result<T, PopulationError>;
