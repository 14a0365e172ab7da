//! Correlated, spectrally shaped noise synthesis.
//!
//! White unit-variance input vectors are spatially correlated with the
//! Cholesky root of the estimated correlation matrix, scaled by `1/sqrt(dt)`
//! so their covariance matches a continuous-time white process sampled at
//! `dt`, then pushed through the block-diagonal discrete filter. The filter
//! state and the last raw input persist across calls, so consecutive
//! generations form one continuous colored process. Time-indexed reads go
//! through a fixed-size cache that regenerates transparently on a miss.

use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::discretize::DiscreteFilterSystem;

/// Draw `n` correlated samples, one per column, as `root * N(0, I)`.
pub fn randn_cov<R: Rng + ?Sized>(rng: &mut R, root: &DMatrix<f64>, n: usize) -> DMatrix<f64> {
    let d = root.nrows();
    let mut white = DMatrix::zeros(d, n);
    for value in white.iter_mut() {
        *value = rng.sample(StandardNormal);
    }
    root * white
}

/// Factor a correlation matrix into a root `L` with `L * L^T = C`.
///
/// Uses the Cholesky factor when the matrix is positive definite. Averaged
/// sample correlations can drift indefinite, in which case the symmetric
/// eigendecomposition with eigenvalues floored at zero provides the nearest
/// positive semidefinite root.
#[must_use]
pub fn correlation_root(correlation: &DMatrix<f64>) -> DMatrix<f64> {
    if let Some(cholesky) = Cholesky::new(correlation.clone()) {
        return cholesky.l();
    }

    debug!("correlation matrix not positive definite, flooring eigenvalues");
    let eigen = SymmetricEigen::new(correlation.clone());
    let sqrt_values = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    &eigen.eigenvectors * DMatrix::from_diagonal(&sqrt_values)
}

/// Stateful generator of correlated, spectrally shaped noise.
pub struct CorrelatedNoiseSource {
    system: DiscreteFilterSystem,
    root: DMatrix<f64>,
    dt: f64,
    cache_steps: usize,
    /// Filter state, mutated by every generation call.
    state: DVector<f64>,
    /// Last raw (unfiltered) input column, prepended to the next batch.
    last_input: DVector<f64>,
    cache: DMatrix<f64>,
    cache_start: f64,
    cache_len: usize,
    rng: StdRng,
}

impl CorrelatedNoiseSource {
    /// Create a source from a discrete filter and a target correlation.
    #[must_use]
    pub fn new(
        system: DiscreteFilterSystem,
        correlation: &DMatrix<f64>,
        dt: f64,
        cache_steps: usize,
        seed: u64,
    ) -> Self {
        let output_dim = system.output_dim();
        let state_dim = system.state_dim();
        Self {
            root: correlation_root(correlation),
            state: DVector::zeros(state_dim),
            last_input: DVector::zeros(output_dim),
            cache: DMatrix::zeros(output_dim, cache_steps),
            cache_start: 0.0,
            cache_len: 0,
            cache_steps,
            system,
            dt,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of output dimensions.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.system.output_dim()
    }

    /// Generate `n` consecutive noise samples, one per column.
    ///
    /// The recursion is strictly sequential: with the carried input
    /// prepended as `u_0`, each step advances `x <- A x + B u_i` and emits
    /// `y_i = C x + D u_{i+1}`, then the final state and the last raw input
    /// are stored. Two calls of `n/2` therefore produce exactly the same
    /// samples as one call of `n`.
    pub fn generate(&mut self, n: usize) -> DMatrix<f64> {
        let d = self.system.output_dim();
        let scale = 1.0 / self.dt.sqrt();

        let mut inputs = DMatrix::zeros(d, n + 1);
        inputs.column_mut(0).copy_from(&self.last_input);
        inputs
            .view_mut((0, 1), (d, n))
            .copy_from(&(randn_cov(&mut self.rng, &self.root, n) * scale));

        let mut output = DMatrix::zeros(d, n);
        for i in 0..n {
            self.state = &self.system.a * &self.state + &self.system.b * inputs.column(i);
            let sample = &self.system.c * &self.state + &self.system.d * inputs.column(i + 1);
            output.column_mut(i).copy_from(&sample);
        }

        self.last_input.copy_from(&inputs.column(n));
        output
    }

    /// Noise sample for a simulation time, served from the cache.
    ///
    /// The requested time is snapped to the nearest step. A time outside the
    /// cached window regenerates a fresh window starting at that time; the
    /// filter state carries over, so contiguous windows stay one continuous
    /// process. Jumping far in time decorrelates the process at the jump,
    /// monotone contiguous queries are the intended access pattern.
    pub fn sample_at(&mut self, time: f64) -> DVector<f64> {
        let offset = ((time - self.cache_start) / self.dt).round();
        if self.cache_len == 0 || offset < 0.0 || offset >= self.cache_len as f64 {
            debug!(time, "noise cache miss, regenerating window");
            let window = self.generate(self.cache_steps);
            self.cache.copy_from(&window);
            self.cache_start = time;
            self.cache_len = self.cache_steps;
            return self.cache.column(0).into_owned();
        }
        self.cache.column(offset as usize).into_owned()
    }
}

// ============================================================================
// Tests
// ============================================================================
