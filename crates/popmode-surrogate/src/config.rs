//! Configuration for surrogate construction.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Grid resolution and extent for the bias table.
///
/// Axis extents are expressed as a multiple of the population radius; point
/// counts shrink with dimensionality to keep the table size bounded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// Axis extent as a multiple of the per-dimension radius
    pub radius_factor: f64,
    /// Point count for one-dimensional populations
    pub line_points: usize,
    /// Per-axis point count for two-dimensional populations
    pub mesh2d_points: usize,
    /// Per-axis point count for three-dimensional populations
    pub mesh3d_points: usize,
    /// Radial point count for populations above three dimensions
    pub radial_points: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            radius_factor: 3.0,
            line_points: 301,
            mesh2d_points: 101,
            mesh3d_points: 41,
            radial_points: 201,
        }
    }
}

/// Monte Carlo settings for noise correlation and spectrum estimation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoiseEstimationConfig {
    /// Number of represented states sampled for spiking runs
    pub eval_points: usize,
    /// Simulated duration per evaluation point (s)
    pub duration: f64,
    /// Simulation time step (s), also the noise filter sample period
    pub dt: f64,
}

impl Default for NoiseEstimationConfig {
    fn default() -> Self {
        Self {
            eval_points: 10,
            duration: 1.0,
            dt: 0.001,
        }
    }
}

/// Settings for fitting transfer functions to noise spectra.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum randomized restarts before a fit is reported as failed
    pub max_attempts: usize,
    /// Maximum optimizer iterations per attempt
    pub max_iterations: usize,
    /// Relative improvement below which an attempt counts as converged
    pub tolerance: f64,
    /// Standard deviation of the randomized restart perturbation
    pub init_spread: f64,
    /// Lower clamp for the initial peak frequency estimate (Hz)
    pub min_peak_hz: f64,
    /// Upper clamp for the initial peak frequency estimate (Hz)
    pub max_peak_hz: f64,
    /// Moving-average window used to smooth the spectrum before the peak
    /// search
    pub smoothing_window: usize,
    /// Initial quality factor
    pub initial_q: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            max_iterations: 200,
            tolerance: 1e-9,
            init_spread: 0.25,
            min_peak_hz: 50.0,
            max_peak_hz: 300.0,
            smoothing_window: 5,
            initial_q: 2.0,
        }
    }
}

/// Top-level surrogate construction configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurrogateConfig {
    /// Bias table grid settings
    pub grid: GridConfig,
    /// Noise estimation settings
    pub estimation: NoiseEstimationConfig,
    /// Transfer function fit settings
    pub fit: FitConfig,
    /// Pre-generated noise samples kept per cache window
    pub cache_steps: usize,
    /// Seed for all stochastic construction stages; a fixed default is used
    /// when absent so builds are reproducible
    pub seed: Option<u64>,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            estimation: NoiseEstimationConfig::default(),
            fit: FitConfig::default(),
            cache_steps: 1000,
            seed: None,
        }
    }
}

impl SurrogateConfig {
    /// Check every field the construction pipeline depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> ModelResult<()> {
        fn positive(parameter: &'static str, value: f64) -> ModelResult<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ModelError::InvalidConfig {
                    parameter,
                    reason: format!("{value} must be positive and finite"),
                })
            }
        }
        fn at_least(parameter: &'static str, value: usize, minimum: usize) -> ModelResult<()> {
            if value >= minimum {
                Ok(())
            } else {
                Err(ModelError::InvalidConfig {
                    parameter,
                    reason: format!("{value} must be at least {minimum}"),
                })
            }
        }

        positive("grid.radius_factor", self.grid.radius_factor)?;
        at_least("grid.line_points", self.grid.line_points, 2)?;
        at_least("grid.mesh2d_points", self.grid.mesh2d_points, 2)?;
        at_least("grid.mesh3d_points", self.grid.mesh3d_points, 2)?;
        at_least("grid.radial_points", self.grid.radial_points, 2)?;

        at_least("estimation.eval_points", self.estimation.eval_points, 1)?;
        positive("estimation.duration", self.estimation.duration)?;
        positive("estimation.dt", self.estimation.dt)?;
        if self.estimation.duration < self.estimation.dt {
            return Err(ModelError::InvalidConfig {
                parameter: "estimation.duration",
                reason: format!(
                    "duration {} is shorter than one step {}",
                    self.estimation.duration, self.estimation.dt
                ),
            });
        }

        at_least("fit.max_attempts", self.fit.max_attempts, 1)?;
        at_least("fit.max_iterations", self.fit.max_iterations, 1)?;
        positive("fit.tolerance", self.fit.tolerance)?;
        positive("fit.init_spread", self.fit.init_spread)?;
        positive("fit.min_peak_hz", self.fit.min_peak_hz)?;
        if self.fit.max_peak_hz <= self.fit.min_peak_hz {
            return Err(ModelError::InvalidConfig {
                parameter: "fit.max_peak_hz",
                reason: format!(
                    "{} must exceed min_peak_hz {}",
                    self.fit.max_peak_hz, self.fit.min_peak_hz
                ),
            });
        }
        at_least("fit.smoothing_window", self.fit.smoothing_window, 1)?;
        positive("fit.initial_q", self.fit.initial_q)?;

        at_least("cache_steps", self.cache_steps, 1)?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
