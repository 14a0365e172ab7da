//! Monte Carlo estimation of decoded-noise statistics.
//!
//! The noise a population adds to its decoded outputs is characterized by
//! running the real spiking dynamics at a handful of random represented
//! states: each run isolates the noise trajectory (decoded output minus the
//! noiseless decode), and the per-state cross-correlation matrix and
//! one-sided magnitude spectra are averaged with uniform weight. Estimating
//! once over random states trades state dependence of the noise for a far
//! cheaper model.

use nalgebra::{DMatrix, DVector};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::{debug, info};

use popmode_core::Population;

use crate::bias::sample_bias;
use crate::config::NoiseEstimationConfig;

/// Averaged noise statistics from Monte Carlo spiking runs.
pub struct NoiseEstimate {
    /// Cross-correlation of the decoded noise across output dimensions,
    /// symmetric with unit diagonal.
    pub correlation: DMatrix<f64>,
    /// One-sided magnitude spectra, one output dimension per row.
    pub spectra: DMatrix<f64>,
    /// Frequency of each spectrum bin (Hz), up to the Nyquist frequency.
    pub freqs_hz: DVector<f64>,
}

/// Runs the Monte Carlo noise characterization.
pub struct NoiseEstimator {
    config: NoiseEstimationConfig,
}

impl NoiseEstimator {
    /// Create an estimator with the given settings.
    #[must_use]
    pub fn new(config: NoiseEstimationConfig) -> Self {
        Self { config }
    }

    /// Number of simulation steps per evaluation point.
    #[must_use]
    pub fn steps(&self) -> usize {
        (self.config.duration / self.config.dt).round().max(1.0) as usize
    }

    /// Estimate noise correlation and spectra for a population.
    ///
    /// Evaluation points are drawn uniformly from the represented box. Each
    /// point resets the population, runs the spike generator for the
    /// configured duration, and decodes every step through every origin;
    /// subtracting the noiseless decode at that point leaves the noise
    /// trajectory.
    pub fn estimate<P, R>(&self, population: &mut P, rng: &mut R) -> NoiseEstimate
    where
        P: Population + ?Sized,
        R: Rng,
    {
        let state_dim = population.state_dim();
        let output_dim = population.output_dim();
        let steps = self.steps();
        let bins = steps / 2 + 1;
        let dt = self.config.dt;

        let point_dists: Vec<Uniform<f64>> = population
            .radii()
            .iter()
            .map(|&r| Uniform::new_inclusive(-r, r))
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(steps);
        let mut buffer = vec![Complex::new(0.0, 0.0); steps];
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let weight = 1.0 / self.config.eval_points as f64;
        let scale = std::f64::consts::PI.sqrt() / steps as f64;

        let mut correlation = DMatrix::zeros(output_dim, output_dim);
        let mut spectra = DMatrix::zeros(output_dim, bins);

        for point_index in 0..self.config.eval_points {
            let point = DVector::from_fn(state_dim, |i, _| point_dists[i].sample(rng));

            // Noiseless decoded output at this state: ideal plus bias.
            let point_matrix = DMatrix::from_fn(state_dim, 1, |i, _| point[i]);
            let expected_sample = sample_bias(population, &point_matrix);
            let expected = expected_sample.ideal.column(0) + expected_sample.bias.column(0);

            population.reset();
            let drive = population.drive(&point);

            let mut noise = DMatrix::zeros(output_dim, steps);
            let mut t = 0.0;
            for k in 0..steps {
                let activity = population.spike_generator().run(&drive, t, t + dt);
                let mut row = 0;
                for origin in population.origins() {
                    let decoded = origin.decode(&activity);
                    for i in 0..origin.dim() {
                        noise[(row + i, k)] = decoded[i] - expected[row + i];
                    }
                    row += origin.dim();
                }
                t += dt;
            }

            correlation += correlation_matrix(&noise) * weight;

            for dim in 0..output_dim {
                for (k, value) in buffer.iter_mut().enumerate() {
                    *value = Complex::new(noise[(dim, k)], 0.0);
                }
                fft.process_with_scratch(&mut buffer, &mut scratch);
                for b in 0..bins {
                    spectra[(dim, b)] += buffer[b].norm() * scale * weight;
                }
            }

            debug!(
                point = point_index + 1,
                total = self.config.eval_points,
                "noise trajectory estimated"
            );
        }

        let freqs_hz = DVector::from_fn(bins, |b, _| b as f64 / (steps as f64 * dt));
        info!(
            eval_points = self.config.eval_points,
            steps, bins, "noise statistics estimated"
        );

        NoiseEstimate {
            correlation,
            spectra,
            freqs_hz,
        }
    }
}

/// Pearson cross-correlation of the rows of a trajectory matrix.
///
/// Constant rows carry no correlation information and contribute an
/// identity row and column.
fn correlation_matrix(rows: &DMatrix<f64>) -> DMatrix<f64> {
    let d = rows.nrows();
    let n = rows.ncols() as f64;
    let means: Vec<f64> = (0..d).map(|i| rows.row(i).sum() / n).collect();

    let mut cov = DMatrix::zeros(d, d);
    for i in 0..d {
        for j in i..d {
            let mut acc = 0.0;
            for k in 0..rows.ncols() {
                acc += (rows[(i, k)] - means[i]) * (rows[(j, k)] - means[j]);
            }
            let value = acc / n;
            cov[(i, j)] = value;
            cov[(j, i)] = value;
        }
    }

    let mut corr = DMatrix::identity(d, d);
    for i in 0..d {
        for j in 0..d {
            if i == j {
                continue;
            }
            let denom = (cov[(i, i)] * cov[(j, j)]).sqrt();
            corr[(i, j)] = if denom > 1e-30 { cov[(i, j)] / denom } else { 0.0 };
        }
    }
    corr
}

// ============================================================================
// Tests
// ============================================================================
