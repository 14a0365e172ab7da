//! Popmode Core - population abstractions for surrogate modeling
//!
//! This crate defines the contract a spiking neural population must satisfy
//! to be fitted by the surrogate engine (`popmode-surrogate`), together with
//! a reference NEF-style leaky integrate-and-fire ensemble that implements
//! it. The engine itself only ever sees the traits; the ensemble exists so
//! that tests, benchmarks and demos have a real population to fit against.
//!
//! # Modules
//!
//! - [`population`]: The [`Population`], [`Origin`] and [`SpikeGenerator`] traits
//! - [`ensemble`]: Reference LIF ensemble with solved tuning curves
//! - [`origin`]: Decoded origins with regularized least-squares decoders
//! - [`stats`]: Shared scalar statistics helpers
//! - [`error`]: Error types for population construction
//!
//! # Example
//!
//! ```rust
//! use popmode_core::{LifEnsemble, LifParameters, Population};
//!
//! let mut ensemble = LifEnsemble::new(40, vec![1.0], LifParameters::default(), 7)?;
//! ensemble.add_origin("x", 1, |state| state.clone())?;
//!
//! // Noiseless rates for a batch of represented states.
//! let points = nalgebra::DMatrix::from_column_slice(1, 3, &[-0.5, 0.0, 0.5]);
//! let rates = ensemble.rates(&points);
//! assert_eq!(rates.ncols(), 3);
//! # Ok::<(), popmode_core::PopulationError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod ensemble;
pub mod error;
pub mod origin;
pub mod population;
pub mod stats;

// Re-export commonly used types at crate root
pub use ensemble::{LifEnsemble, LifParameters, LifSpikeGenerator};
pub use error::{PopulationError, PopulationResult};
pub use origin::{DecodedOrigin, IdealFn};
pub use population::{Origin, Population, SpikeGenerator};
