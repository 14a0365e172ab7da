//! Popmode Surrogate - statistical surrogate models for spiking populations
//!
//! Running every population of a large spiking network at full neuron-level
//! detail is wasteful when only the decoded outputs matter. This crate fits
//! a cheap statistical stand-in for a population's decoded error behavior:
//! a gridded **bias** table (the deterministic decode error as a function of
//! the represented state) plus a **correlated noise** process whose spatial
//! correlation and per-dimension power spectra are estimated from Monte
//! Carlo runs of the real population, fitted with second-order transfer
//! functions, and discretized into a block-diagonal state-space filter.
//!
//! # Modules
//!
//! - [`grid`]: State-space grids and the bias lookup table
//! - [`bias`]: Batched decoded-bias sampling
//! - [`spectral`]: Monte Carlo noise correlation and spectrum estimation
//! - [`tf`]: Second-order transfer functions
//! - [`fit`]: Least-squares spectrum fitting with randomized retries
//! - [`discretize`]: Zero-order-hold discretization and block assembly
//! - [`noise`]: Correlated, spectrally shaped noise synthesis
//! - [`model`]: Surrogate trait, default implementation and factory
//! - [`config`]: Construction configuration
//! - [`error`]: Engine error types
//!
//! # Example
//!
//! ```rust
//! use popmode_core::{LifEnsemble, LifParameters};
//! use popmode_surrogate::{PopulationSurrogate, SurrogateConfig, SurrogateModel};
//!
//! let mut ensemble = LifEnsemble::new(40, vec![1.0], LifParameters::default(), 7)?;
//! ensemble.add_origin("x", 1, |state| state.clone())?;
//!
//! let mut config = SurrogateConfig::default();
//! config.estimation.duration = 0.2;
//! config.seed = Some(7);
//!
//! let mut surrogate = PopulationSurrogate::build(&mut ensemble, &config)?;
//! let bias = surrogate.bias(&[0.25]);
//! let noise = surrogate.noise(0.0);
//! assert_eq!(bias.len(), noise.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod bias;
pub mod config;
pub mod discretize;
pub mod error;
pub mod fit;
pub mod grid;
pub mod model;
pub mod noise;
pub mod spectral;
pub mod tf;

// Re-export commonly used types at crate root
pub use bias::{origin_index_map, sample_bias, BiasSample};
pub use config::{FitConfig, GridConfig, NoiseEstimationConfig, SurrogateConfig};
pub use discretize::{zoh, DiscreteFilterSystem, FilterBlock};
pub use error::{FitError, FitResult, ModelError, ModelResult};
pub use fit::SpectrumFitter;
pub use grid::{Axis, BiasGrid, BiasTable};
pub use model::{
    build_surrogate, BiasSurrogate, PopulationSurrogate, SurrogateKind, SurrogateModel,
};
pub use noise::CorrelatedNoiseSource;
pub use spectral::{NoiseEstimate, NoiseEstimator};
pub use tf::TransferFunction;
