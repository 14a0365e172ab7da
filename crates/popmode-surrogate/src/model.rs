//! Surrogate model assembly and runtime evaluation.
//!
//! Construction runs the full pipeline once, up front: grid the state
//! space, sample the decoded bias in one batch, estimate noise statistics
//! by Monte Carlo, fit per-dimension transfer functions, discretize them,
//! and seed the correlated noise source. The result answers bias queries by
//! table lookup and noise queries from the cached filter output, both cheap
//! enough for inner simulation loops.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use popmode_core::Population;

use crate::bias::{origin_index_map, sample_bias};
use crate::config::{GridConfig, SurrogateConfig};
use crate::discretize::{zoh, DiscreteFilterSystem, FilterBlock};
use crate::error::{ModelError, ModelResult};
use crate::fit::SpectrumFitter;
use crate::grid::{BiasGrid, BiasTable};
use crate::noise::CorrelatedNoiseSource;
use crate::spectral::NoiseEstimator;
use crate::tf::TransferFunction;

const DEFAULT_SEED: u64 = 0x5eed;

/// A fitted stand-in for one population's decoded error behavior.
///
/// Implementations answer two queries at runtime: the deterministic bias at
/// a represented state and the next correlated noise sample at a simulation
/// time. `noise` takes `&mut self` because the filter state advances with
/// time; queries are expected in non-decreasing time order.
pub trait SurrogateModel: Send {
    /// Map from each output dimension to the owning origin's index.
    fn origin_indices(&self) -> &[usize];

    /// Total decoded output dimensionality.
    fn output_dim(&self) -> usize;

    /// Deterministic decode error at a represented state.
    fn bias(&self, state: &[f64]) -> DVector<f64>;

    /// Correlated noise sample for a simulation time.
    fn noise(&mut self, time: f64) -> DVector<f64>;
}

/// Which surrogate variant the factory should build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurrogateKind {
    /// Bias table plus correlated spectrally shaped noise.
    #[default]
    BiasNoise,
    /// Bias table only; noise queries return zero.
    BiasOnly,
}

/// Build a surrogate of the requested kind for a population.
///
/// # Errors
///
/// Returns [`ModelError`] for invalid configurations, populations without
/// radii or origins, and unrecoverable fit failures.
pub fn build_surrogate<P: Population + ?Sized>(
    kind: SurrogateKind,
    population: &mut P,
    config: &SurrogateConfig,
) -> ModelResult<Box<dyn SurrogateModel>> {
    match kind {
        SurrogateKind::BiasNoise => Ok(Box::new(PopulationSurrogate::build(population, config)?)),
        SurrogateKind::BiasOnly => Ok(Box::new(BiasSurrogate::build(population, config)?)),
    }
}

fn check_preconditions<P: Population + ?Sized>(population: &P) -> ModelResult<()> {
    if population.radii().is_empty() {
        return Err(ModelError::EmptyRadii);
    }
    if population.origins().is_empty() {
        return Err(ModelError::NoOrigins);
    }
    Ok(())
}

fn build_bias_table<P: Population + ?Sized>(
    population: &P,
    grid_config: &GridConfig,
) -> ModelResult<BiasTable> {
    let grid = BiasGrid::for_radii(population.radii(), grid_config)?;
    let points = grid.sample_points();
    info!(
        grid_points = points.ncols(),
        state_dim = population.state_dim(),
        "sampling decoded bias"
    );
    let sample = sample_bias(population, &points);
    Ok(BiasTable::new(grid, sample.bias))
}

// ============================================================================
// Bias + noise surrogate
// ============================================================================

/// The default surrogate: gridded bias plus correlated filtered noise.
pub struct PopulationSurrogate {
    origin_indices: Vec<usize>,
    table: BiasTable,
    transfer_functions: Vec<TransferFunction>,
    correlation: DMatrix<f64>,
    noise: CorrelatedNoiseSource,
}

impl PopulationSurrogate {
    /// Fit a surrogate to a population.
    ///
    /// Construction simulates the population for
    /// `estimation.eval_points * estimation.duration` seconds of spiking
    /// and can take seconds to minutes for large populations; progress is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for a bad configuration,
    /// [`ModelError::EmptyRadii`] / [`ModelError::NoOrigins`] for an
    /// unusable population, and [`ModelError::Fit`] when a spectrum fit
    /// exhausts its retries.
    pub fn build<P: Population + ?Sized>(
        population: &mut P,
        config: &SurrogateConfig,
    ) -> ModelResult<Self> {
        config.validate()?;
        check_preconditions(population)?;
        let seed = config.seed.unwrap_or(DEFAULT_SEED);

        info!(
            state_dim = population.state_dim(),
            output_dim = population.output_dim(),
            "building population surrogate"
        );

        let table = build_bias_table(population, &config.grid)?;

        let estimator = NoiseEstimator::new(config.estimation.clone());
        let mut rng = StdRng::seed_from_u64(seed);
        let estimate = estimator.estimate(population, &mut rng);

        let fitter = SpectrumFitter::new(config.fit.clone());
        let transfer_functions = fitter.fit_all(&estimate.freqs_hz, &estimate.spectra, seed)?;
        info!(
            dims = transfer_functions.len(),
            "transfer functions fitted"
        );

        let blocks: Vec<FilterBlock> = transfer_functions
            .iter()
            .map(|tf| zoh(tf, config.estimation.dt))
            .collect();
        let system = DiscreteFilterSystem::block_diagonal(&blocks);
        let noise = CorrelatedNoiseSource::new(
            system,
            &estimate.correlation,
            config.estimation.dt,
            config.cache_steps,
            seed.wrapping_add(1),
        );

        Ok(Self {
            origin_indices: origin_index_map(population),
            table,
            transfer_functions,
            correlation: estimate.correlation,
            noise,
        })
    }

    /// The fitted bias table.
    #[must_use]
    pub fn bias_table(&self) -> &BiasTable {
        &self.table
    }

    /// The fitted per-dimension transfer functions.
    #[must_use]
    pub fn transfer_functions(&self) -> &[TransferFunction] {
        &self.transfer_functions
    }

    /// The estimated noise cross-correlation matrix.
    #[must_use]
    pub fn correlation(&self) -> &DMatrix<f64> {
        &self.correlation
    }
}

impl SurrogateModel for PopulationSurrogate {
    fn origin_indices(&self) -> &[usize] {
        &self.origin_indices
    }

    fn output_dim(&self) -> usize {
        self.table.output_dim()
    }

    fn bias(&self, state: &[f64]) -> DVector<f64> {
        self.table.lookup(state)
    }

    fn noise(&mut self, time: f64) -> DVector<f64> {
        self.noise.sample_at(time)
    }
}

// ============================================================================
// Bias-only surrogate
// ============================================================================

/// Bias-table surrogate with silent noise, for runs where spiking noise is
/// deliberately excluded.
pub struct BiasSurrogate {
    origin_indices: Vec<usize>,
    table: BiasTable,
}

impl BiasSurrogate {
    /// Fit the bias table without any noise estimation.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] for a bad configuration and
    /// [`ModelError::EmptyRadii`] / [`ModelError::NoOrigins`] for an
    /// unusable population.
    pub fn build<P: Population + ?Sized>(
        population: &mut P,
        config: &SurrogateConfig,
    ) -> ModelResult<Self> {
        config.validate()?;
        check_preconditions(population)?;
        let table = build_bias_table(population, &config.grid)?;
        Ok(Self {
            origin_indices: origin_index_map(population),
            table,
        })
    }

    /// The fitted bias table.
    #[must_use]
    pub fn bias_table(&self) -> &BiasTable {
        &self.table
    }
}

impl SurrogateModel for BiasSurrogate {
    fn origin_indices(&self) -> &[usize] {
        &self.origin_indices
    }

    fn output_dim(&self) -> usize {
        self.table.output_dim()
    }

    fn bias(&self, state: &[f64]) -> DVector<f64> {
        self.table.lookup(state)
    }

    fn noise(&mut self, _time: f64) -> DVector<f64> {
        DVector::zeros(self.table.output_dim())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use popmode_core::{LifEnsemble, LifParameters, Origin, SpikeGenerator};

    fn test_config(seed: u64) -> SurrogateConfig {
        let mut config = SurrogateConfig::default();
        config.estimation.duration = 0.5;
        config.estimation.eval_points = 5;
        config.fit.tolerance = 1e-7;
        config.seed = Some(seed);
        config
    }

    fn identity_ensemble(seed: u64) -> LifEnsemble {
        let mut ensemble =
            LifEnsemble::new(50, vec![1.0], LifParameters::default(), seed).unwrap();
        ensemble
            .add_origin("x", 1, |state: &DVector<f64>| state.clone())
            .unwrap();
        ensemble
    }

    #[test]
    fn test_one_dimensional_end_to_end() {
        let mut ensemble = identity_ensemble(7);
        let mut surrogate = PopulationSurrogate::build(&mut ensemble, &test_config(7)).unwrap();

        let BiasGrid::Line { x } = surrogate.bias_table().grid() else {
            panic!("expected a line grid for a 1-D population");
        };
        assert_eq!(x.len(), 301);
        assert!((x.value(0) + 3.0).abs() < 1e-12);
        assert!((x.value(300) - 3.0).abs() < 1e-12);

        // The middle grid point sits at the origin.
        let center = surrogate.bias(&[0.0]);
        assert_eq!(center, surrogate.bias_table().column(150));

        // Far outside the grid the lookup clamps to the edge.
        assert_eq!(surrogate.bias(&[10.0]), surrogate.bias(&[3.0]));

        assert_eq!(surrogate.origin_indices(), &[0]);
        assert_eq!(surrogate.output_dim(), 1);
        assert_eq!(surrogate.transfer_functions().len(), 1);
        assert!((surrogate.correlation()[(0, 0)] - 1.0).abs() < 1e-9);

        let first = surrogate.noise(0.0);
        let second = surrogate.noise(0.001);
        assert!(first[0].is_finite());
        assert!(second[0].is_finite());
    }

    #[test]
    fn test_builds_are_reproducible() {
        let mut first = identity_ensemble(19);
        let mut second = identity_ensemble(19);

        let mut a = PopulationSurrogate::build(&mut first, &test_config(19)).unwrap();
        let mut b = PopulationSurrogate::build(&mut second, &test_config(19)).unwrap();

        assert_eq!(a.bias(&[0.4]), b.bias(&[0.4]));
        let tf_a = a.transfer_functions()[0];
        let tf_b = b.transfer_functions()[0];
        assert!((tf_a.w0 - tf_b.w0).abs() < 1e-12);
        assert_eq!(a.noise(0.0), b.noise(0.0));
    }

    #[test]
    fn test_bias_only_factory_variant() {
        let mut ensemble = identity_ensemble(31);
        let mut surrogate =
            build_surrogate(SurrogateKind::BiasOnly, &mut ensemble, &test_config(31)).unwrap();

        assert_eq!(surrogate.output_dim(), 1);
        let noise = surrogate.noise(0.0);
        assert!(noise[0].abs() < 1e-15);

        // Bias matches the full surrogate, which shares the same
        // deterministic sampling path.
        let mut full = identity_ensemble(31);
        let full = PopulationSurrogate::build(&mut full, &test_config(31)).unwrap();
        assert_eq!(surrogate.bias(&[0.5]), full.bias(&[0.5]));
    }

    #[test]
    fn test_population_without_origins_is_rejected() {
        let mut ensemble =
            LifEnsemble::new(30, vec![1.0], LifParameters::default(), 3).unwrap();
        let result = PopulationSurrogate::build(&mut ensemble, &test_config(3));
        assert!(matches!(result, Err(ModelError::NoOrigins)));
    }

    // Minimal population with no radii, to exercise the other fatal
    // precondition; only the accessors the check reads are meaningful.
    struct NoRadiiPopulation {
        origins: Vec<Box<dyn Origin>>,
        generator: IdleGenerator,
    }

    struct IdleGenerator;

    impl SpikeGenerator for IdleGenerator {
        fn run(&mut self, _drive: &DVector<f64>, _t0: f64, _t1: f64) -> DVector<f64> {
            DVector::zeros(0)
        }
        fn reset(&mut self) {}
    }

    impl Population for NoRadiiPopulation {
        fn radii(&self) -> &[f64] {
            &[]
        }
        fn origins(&self) -> &[Box<dyn Origin>] {
            &self.origins
        }
        fn rates(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
            DMatrix::zeros(0, points.ncols())
        }
        fn drive(&self, _state: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }
        fn spike_generator(&mut self) -> &mut dyn SpikeGenerator {
            &mut self.generator
        }
        fn reset(&mut self) {}
    }

    #[test]
    fn test_population_without_radii_is_rejected() {
        let mut population = NoRadiiPopulation {
            origins: Vec::new(),
            generator: IdleGenerator,
        };
        let result = PopulationSurrogate::build(&mut population, &test_config(1));
        assert!(matches!(result, Err(ModelError::EmptyRadii)));
    }
}
