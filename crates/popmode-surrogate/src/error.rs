//! Error types for surrogate construction.

use thiserror::Error;

/// Transfer function fitting error types
#[derive(Error, Debug)]
pub enum FitError {
    /// Every randomized restart was rejected
    #[error(
        "Transfer function fit for output dimension {dim} did not converge after {attempts} attempts (best MSE: {best_mse:.3e})"
    )]
    DidNotConverge {
        /// Output dimension being fitted
        dim: usize,
        /// Number of attempts made
        attempts: usize,
        /// Best mean squared residual seen across attempts
        best_mse: f64,
    },

    /// Spectrum has too few frequency bins to fit five parameters
    #[error("Spectrum has {got} frequency bins, need at least {need}")]
    SpectrumTooShort {
        /// Number of bins received
        got: usize,
        /// Number of bins needed
        need: usize,
    },
}

/// Surrogate construction error types
#[derive(Error, Debug)]
pub enum ModelError {
    /// Population declared with no representational radii
    #[error("Population has no representational radii")]
    EmptyRadii,

    /// Population has no decoded origins
    #[error("Population has no decoded origins")]
    NoOrigins,

    /// Configuration field rejected before construction
    #[error("Invalid configuration value for {parameter}: {reason}")]
    InvalidConfig {
        /// Field name
        parameter: &'static str,
        /// Reason the value was rejected
        reason: String,
    },

    /// Spectrum fit failed for one output dimension
    #[error("Spectrum fit failed: {0}")]
    Fit(#[from] FitError),
}

/// Result type for fit operations
pub type FitResult<T> = Result<T, FitError>;

/// Result type for surrogate construction
pub type ModelResult<T> = Result<T, ModelError>;
