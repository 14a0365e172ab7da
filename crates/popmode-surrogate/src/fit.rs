//! Least-squares fitting of transfer functions to magnitude spectra.
//!
//! Each output dimension's spectrum is fitted independently with
//! Levenberg-Marquardt over five normalized parameters. The optimizer works
//! in band gains (DC, resonance, high-frequency) rather than polynomial
//! coefficients so that the spectrum-derived initial scales put every
//! parameter near 1; the fitted gains convert to [`TransferFunction`]
//! coefficients on acceptance. Failed attempts restart from randomized
//! initial parameters up to a configured bound.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::FitConfig;
use crate::error::{FitError, FitResult};
use crate::tf::TransferFunction;

const N_PARAMS: usize = 5;
const MIN_BINS: usize = 8;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_GROW: f64 = 10.0;
const LAMBDA_SHRINK: f64 = 0.25;
const LAMBDA_MAX: f64 = 1e12;
const JACOBIAN_STEP: f64 = 1e-6;

/// Fits second-order transfer functions to noise magnitude spectra.
pub struct SpectrumFitter {
    config: FitConfig,
}

impl SpectrumFitter {
    /// Create a fitter with the given settings.
    #[must_use]
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    /// Fit every row of `spectra` independently.
    ///
    /// Rows are distributed across threads; each dimension derives its own
    /// RNG from `seed`, so results do not depend on scheduling.
    ///
    /// # Errors
    ///
    /// Returns a failing dimension's [`FitError`] when any fit exhausts its
    /// allowed attempts.
    pub fn fit_all(
        &self,
        freqs_hz: &DVector<f64>,
        spectra: &DMatrix<f64>,
        seed: u64,
    ) -> FitResult<Vec<TransferFunction>> {
        (0..spectra.nrows())
            .into_par_iter()
            .map(|dim| {
                let mut rng = StdRng::seed_from_u64(
                    seed ^ (dim as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
                );
                let magnitude = spectra.row(dim).transpose();
                self.fit_dimension(freqs_hz, &magnitude, dim, &mut rng)
            })
            .collect()
    }

    /// Fit one output dimension's magnitude spectrum.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::SpectrumTooShort`] for fewer than eight bins and
    /// [`FitError::DidNotConverge`] when every randomized restart is
    /// rejected.
    pub fn fit_dimension(
        &self,
        freqs_hz: &DVector<f64>,
        magnitude: &DVector<f64>,
        dim: usize,
        rng: &mut StdRng,
    ) -> FitResult<TransferFunction> {
        debug_assert_eq!(freqs_hz.len(), magnitude.len());
        let bins = magnitude.len();
        if bins < MIN_BINS {
            return Err(FitError::SpectrumTooShort {
                got: bins,
                need: MIN_BINS,
            });
        }

        // A constant-zero spectrum needs no optimizer; the pole location is
        // arbitrary at zero gain.
        if magnitude.amax() < 1e-12 {
            debug!(dim, "degenerate spectrum, using zero-gain filter");
            return Ok(TransferFunction::zero_gain(
                std::f64::consts::TAU * self.config.min_peak_hz,
                self.config.initial_q,
            ));
        }

        let scales = self.heuristic_scales(freqs_hz, magnitude);
        let omega = freqs_hz * std::f64::consts::TAU;

        let mut best_mse = f64::INFINITY;
        for attempt in 0..self.config.max_attempts {
            let theta0 = if attempt == 0 {
                DVector::from_element(N_PARAMS, 1.0)
            } else {
                DVector::from_fn(N_PARAMS, |_, _| {
                    let jitter: f64 = rng.sample(StandardNormal);
                    (1.0 + self.config.init_spread * jitter).max(0.1)
                })
            };

            let outcome = levenberg_marquardt(&theta0, &scales, &omega, magnitude, &self.config);
            if outcome.mse.is_finite() && outcome.mse < best_mse {
                best_mse = outcome.mse;
            }
            if !outcome.converged {
                trace!(dim, attempt, mse = outcome.mse, "fit attempt stalled");
                continue;
            }

            let tf = assemble(&outcome.theta, &scales);
            if !is_valid(&tf) {
                trace!(dim, attempt, "fit attempt produced invalid parameters");
                continue;
            }

            debug!(dim, attempt, mse = outcome.mse, "spectrum fit accepted");
            return Ok(tf);
        }

        Err(FitError::DidNotConverge {
            dim,
            attempts: self.config.max_attempts,
            best_mse,
        })
    }

    /// Initial parameter scales read off the spectrum: band gains from the
    /// low/high-frequency averages and a natural frequency from the smoothed
    /// peak, clamped to the configured range.
    fn heuristic_scales(&self, freqs_hz: &DVector<f64>, magnitude: &DVector<f64>) -> DVector<f64> {
        let bins = magnitude.len();
        let band = (bins / 10).max(1);

        let low: f64 = magnitude.rows(0, band).sum() / band as f64;
        let high: f64 = magnitude.rows(bins - band, band).sum() / band as f64;
        let mid = 0.5 * (low + high);

        let smoothed = moving_average(magnitude.as_slice(), self.config.smoothing_window);
        let peak_bin = smoothed
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i);
        let peak_hz = freqs_hz[peak_bin].clamp(self.config.min_peak_hz, self.config.max_peak_hz);

        DVector::from_column_slice(&[
            low,
            mid,
            high,
            std::f64::consts::TAU * peak_hz,
            self.config.initial_q,
        ])
    }
}

/// Convert normalized parameters into a transfer function.
///
/// The five entries of `theta .* scales` are the DC gain, the resonance
/// gain, the high-frequency gain, `w0` and `q`; gains map to numerator
/// coefficients through `a0 = g0*w0^2`, `a1 = g1*w0/q`, `a2 = g2`.
fn assemble(theta: &DVector<f64>, scales: &DVector<f64>) -> TransferFunction {
    let g0 = theta[0] * scales[0];
    let g1 = theta[1] * scales[1];
    let g2 = theta[2] * scales[2];
    let w0 = theta[3] * scales[3];
    let q = theta[4] * scales[4];
    TransferFunction {
        a0: g0 * w0 * w0,
        a1: g1 * w0 / q,
        a2: g2,
        w0,
        q,
    }
}

fn is_valid(tf: &TransferFunction) -> bool {
    [tf.a0, tf.a1, tf.a2, tf.w0, tf.q]
        .iter()
        .all(|v| v.is_finite())
        && tf.w0 > 0.0
        && tf.q > 0.0
}

fn residuals(
    theta: &DVector<f64>,
    scales: &DVector<f64>,
    omega: &DVector<f64>,
    target: &DVector<f64>,
) -> DVector<f64> {
    let tf = assemble(theta, scales);
    DVector::from_fn(omega.len(), |i, _| tf.magnitude_at(omega[i]) - target[i])
}

fn jacobian(
    theta: &DVector<f64>,
    scales: &DVector<f64>,
    omega: &DVector<f64>,
    target: &DVector<f64>,
) -> DMatrix<f64> {
    let n = omega.len();
    let mut jac = DMatrix::zeros(n, N_PARAMS);
    for p in 0..N_PARAMS {
        let h = JACOBIAN_STEP * theta[p].abs().max(1.0);
        let mut plus = theta.clone();
        let mut minus = theta.clone();
        plus[p] += h;
        minus[p] -= h;
        let rp = residuals(&plus, scales, omega, target);
        let rm = residuals(&minus, scales, omega, target);
        for i in 0..n {
            jac[(i, p)] = (rp[i] - rm[i]) / (2.0 * h);
        }
    }
    jac
}

struct LmOutcome {
    theta: DVector<f64>,
    mse: f64,
    converged: bool,
}

/// Levenberg-Marquardt with a central-difference Jacobian and identity
/// damping. Identity damping keeps the normal equations solvable even when
/// a zero scale locks a parameter's Jacobian column at zero.
fn levenberg_marquardt(
    theta0: &DVector<f64>,
    scales: &DVector<f64>,
    omega: &DVector<f64>,
    target: &DVector<f64>,
    config: &FitConfig,
) -> LmOutcome {
    let n = omega.len() as f64;
    let mut theta = theta0.clone();
    let mut residual = residuals(&theta, scales, omega, target);
    let mut mse = residual.norm_squared() / n;
    if !mse.is_finite() {
        return LmOutcome {
            theta,
            mse,
            converged: false,
        };
    }

    let mut lambda = LAMBDA_INIT;
    for _ in 0..config.max_iterations {
        let jac = jacobian(&theta, scales, omega, target);
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &residual;

        // Stationary point: nothing left to descend.
        if jtr.amax() < 1e-12 {
            return LmOutcome {
                theta,
                mse,
                converged: true,
            };
        }

        loop {
            let mut damped = jtj.clone();
            for i in 0..N_PARAMS {
                damped[(i, i)] += lambda;
            }
            let Some(cholesky) = Cholesky::new(damped) else {
                lambda *= LAMBDA_GROW;
                if lambda > LAMBDA_MAX {
                    return LmOutcome {
                        theta,
                        mse,
                        converged: false,
                    };
                }
                continue;
            };
            let step = cholesky.solve(&jtr);
            let candidate = &theta - &step;
            let candidate_residual = residuals(&candidate, scales, omega, target);
            let candidate_mse = candidate_residual.norm_squared() / n;

            if candidate_mse.is_finite() && candidate_mse < mse {
                let improvement = (mse - candidate_mse) / mse.max(1e-300);
                theta = candidate;
                residual = candidate_residual;
                mse = candidate_mse;
                lambda = (lambda * LAMBDA_SHRINK).max(1e-12);
                if improvement < config.tolerance {
                    return LmOutcome {
                        theta,
                        mse,
                        converged: true,
                    };
                }
                break;
            }

            lambda *= LAMBDA_GROW;
            if lambda > LAMBDA_MAX {
                // No damping level improves the fit; a tiny residual means
                // we are already at the optimum.
                let converged = mse < 1e-18;
                return LmOutcome {
                    theta,
                    mse,
                    converged,
                };
            }
        }
    }

    LmOutcome {
        theta,
        mse,
        converged: false,
    }
}

/// Centered moving average with shrinking windows at the edges.
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_spectrum(tf: &TransferFunction, bins: usize) -> (DVector<f64>, DVector<f64>) {
        let freqs = DVector::from_fn(bins, |i, _| i as f64);
        let magnitude =
            DVector::from_fn(bins, |i, _| tf.magnitude_at(std::f64::consts::TAU * freqs[i]));
        (freqs, magnitude)
    }

    #[test]
    fn test_recovers_synthetic_transfer_function() {
        let w0 = std::f64::consts::TAU * 120.0;
        let truth = TransferFunction {
            a0: 0.002 * w0 * w0,
            a1: 0.005 * w0 / 2.5,
            a2: 0.001,
            w0,
            q: 2.5,
        };
        let (freqs, magnitude) = synthetic_spectrum(&truth, 501);

        let fitter = SpectrumFitter::new(FitConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        let fitted = fitter.fit_dimension(&freqs, &magnitude, 0, &mut rng).unwrap();

        let mut sse = 0.0;
        for i in 0..freqs.len() {
            let omega = std::f64::consts::TAU * freqs[i];
            sse += (fitted.magnitude_at(omega) - magnitude[i]).powi(2);
        }
        assert!(sse / (freqs.len() as f64) < 1e-8);
        assert!((fitted.w0 - truth.w0).abs() / truth.w0 < 0.02);
    }

    #[test]
    fn test_fit_all_dimensions_below_threshold() {
        let peaks = [80.0, 120.0, 160.0, 200.0, 240.0, 90.0, 140.0, 260.0];
        let bins = 501;
        let freqs = DVector::from_fn(bins, |i, _| i as f64);
        let mut spectra = DMatrix::zeros(peaks.len(), bins);
        for (dim, &peak) in peaks.iter().enumerate() {
            let w0 = std::f64::consts::TAU * peak;
            let truth = TransferFunction {
                a0: 0.003 * w0 * w0,
                a1: 0.006 * w0 / 2.0,
                a2: 0.0015,
                w0,
                q: 2.0,
            };
            for i in 0..bins {
                spectra[(dim, i)] = truth.magnitude_at(std::f64::consts::TAU * freqs[i]);
            }
        }

        let fitter = SpectrumFitter::new(FitConfig::default());
        let fitted = fitter.fit_all(&freqs, &spectra, 99).unwrap();
        assert_eq!(fitted.len(), peaks.len());

        for (dim, tf) in fitted.iter().enumerate() {
            let mut sse = 0.0;
            for i in 0..bins {
                let omega = std::f64::consts::TAU * freqs[i];
                sse += (tf.magnitude_at(omega) - spectra[(dim, i)]).powi(2);
            }
            assert!(sse / (bins as f64) < 1e-6, "dimension {dim} fit too loose");
        }
    }

    #[test]
    fn test_flat_spectrum_fits_constant_gain() {
        let bins = 101;
        let freqs = DVector::from_fn(bins, |i, _| 5.0 * i as f64);
        let magnitude = DVector::from_element(bins, 0.02);

        let fitter = SpectrumFitter::new(FitConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        let fitted = fitter.fit_dimension(&freqs, &magnitude, 0, &mut rng).unwrap();
        for i in 0..bins {
            let omega = std::f64::consts::TAU * freqs[i];
            assert!((fitted.magnitude_at(omega) - 0.02).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_spectrum_yields_zero_gain() {
        let bins = 64;
        let freqs = DVector::from_fn(bins, |i, _| i as f64);
        let magnitude = DVector::zeros(bins);

        let fitter = SpectrumFitter::new(FitConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let fitted = fitter.fit_dimension(&freqs, &magnitude, 0, &mut rng).unwrap();
        assert!(fitted.magnitude_at(0.0).abs() < 1e-15);
        assert!(fitted.magnitude_at(1000.0).abs() < 1e-15);
        assert!(fitted.w0 > 0.0);
    }

    #[test]
    fn test_short_spectrum_is_rejected() {
        let freqs = DVector::from_column_slice(&[0.0, 1.0, 2.0, 3.0]);
        let magnitude = DVector::from_element(4, 1.0);
        let fitter = SpectrumFitter::new(FitConfig::default());
        let mut rng = StdRng::seed_from_u64(0);
        let result = fitter.fit_dimension(&freqs, &magnitude, 2, &mut rng);
        assert!(matches!(
            result,
            Err(FitError::SpectrumTooShort { got: 4, need: 8 })
        ));
    }

    #[test]
    fn test_exhausted_retries_report_best_mse() {
        // One iteration cannot converge on a jagged non-rational target.
        let bins = 64;
        let freqs = DVector::from_fn(bins, |i, _| i as f64);
        let magnitude = DVector::from_fn(bins, |i, _| if i % 2 == 0 { 1.0 } else { 0.05 });

        let config = FitConfig {
            max_attempts: 3,
            max_iterations: 1,
            tolerance: 1e-15,
            ..FitConfig::default()
        };
        let fitter = SpectrumFitter::new(config);
        let mut rng = StdRng::seed_from_u64(5);
        let result = fitter.fit_dimension(&freqs, &magnitude, 4, &mut rng);
        match result {
            Err(FitError::DidNotConverge { dim, attempts, best_mse }) => {
                assert_eq!(dim, 4);
                assert_eq!(attempts, 3);
                assert!(best_mse.is_finite());
            }
            other => panic!("expected DidNotConverge, got {other:?}"),
        }
    }

    #[test]
    fn test_moving_average_smooths_edges() {
        let values = [1.0, 3.0, 5.0, 7.0, 9.0];
        let smoothed = moving_average(&values, 3);
        assert!((smoothed[0] - 2.0).abs() < 1e-12);
        assert!((smoothed[2] - 5.0).abs() < 1e-12);
        assert!((smoothed[4] - 8.0).abs() < 1e-12);
    }
}
