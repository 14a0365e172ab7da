//! Reference leaky integrate-and-fire ensemble.
//!
//! An NEF-style population: each neuron has a random unit encoder, a gain
//! and a bias current solved from a sampled maximum rate and intercept, a
//! static LIF rate curve for noiseless queries, and spiking dynamics whose
//! post-synaptic-current-filtered activity matches the static rates in the
//! mean. The surrogate engine consumes it through the [`Population`] trait
//! only.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::error::{PopulationError, PopulationResult};
use crate::origin::{DecodedOrigin, IdealFn};
use crate::population::{Origin, Population, SpikeGenerator};

// ============================================================================
// Parameters
// ============================================================================

/// Tuning and dynamics parameters for [`LifEnsemble`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifParameters {
    /// Membrane time constant (s)
    pub tau_rc: f64,
    /// Absolute refractory period (s)
    pub tau_ref: f64,
    /// Post-synaptic current time constant (s)
    pub tau_psc: f64,
    /// Lower bound of the sampled per-neuron maximum rate (Hz)
    pub max_rate_min: f64,
    /// Upper bound of the sampled per-neuron maximum rate (Hz)
    pub max_rate_max: f64,
    /// Lower bound of the sampled per-neuron intercept
    pub intercept_min: f64,
    /// Upper bound of the sampled per-neuron intercept
    pub intercept_max: f64,
    /// Ridge regularization for decoder solves, relative to the mean
    /// diagonal of the Gram matrix
    pub decoder_regularization: f64,
    /// Number of evaluation points sampled per decoder solve
    pub decoder_points: usize,
}

impl Default for LifParameters {
    fn default() -> Self {
        Self {
            tau_rc: 0.02,
            tau_ref: 0.002,
            tau_psc: 0.005,
            max_rate_min: 200.0,
            max_rate_max: 400.0,
            intercept_min: -0.95,
            intercept_max: 0.95,
            decoder_regularization: 0.01,
            decoder_points: 500,
        }
    }
}

// ============================================================================
// Static rate curve
// ============================================================================

/// Static LIF response rate (Hz) for a normalized drive current.
///
/// The curve is `1 / (tau_ref - tau_rc * ln(1 - 1/j))` above the threshold
/// current `j = 1` and zero at or below it.
pub fn lif_rate(j: f64, tau_rc: f64, tau_ref: f64) -> f64 {
    if j > 1.0 {
        1.0 / (tau_ref - tau_rc * (1.0 - 1.0 / j).ln())
    } else {
        0.0
    }
}

// ============================================================================
// Spiking dynamics
// ============================================================================

/// Spiking LIF dynamics with an exponential post-synaptic filter.
///
/// Voltages integrate `tau_rc * dv/dt = j - v` with threshold 1 and reset 0;
/// each spike deposits a unit-area impulse into the post-synaptic filter, so
/// the filtered activity has the static rate as its steady-state mean.
pub struct LifSpikeGenerator {
    tau_rc: f64,
    tau_ref: f64,
    tau_psc: f64,
    voltage: DVector<f64>,
    refractory: DVector<f64>,
    psc: DVector<f64>,
    rng: StdRng,
}

impl LifSpikeGenerator {
    fn new(n_neurons: usize, tau_rc: f64, tau_ref: f64, tau_psc: f64, seed: u64) -> Self {
        let mut generator = Self {
            tau_rc,
            tau_ref,
            tau_psc,
            voltage: DVector::zeros(n_neurons),
            refractory: DVector::zeros(n_neurons),
            psc: DVector::zeros(n_neurons),
            rng: StdRng::seed_from_u64(seed),
        };
        generator.reset();
        generator
    }
}

impl SpikeGenerator for LifSpikeGenerator {
    fn run(&mut self, drive: &DVector<f64>, t_start: f64, t_end: f64) -> DVector<f64> {
        let dt = t_end - t_start;
        if dt <= 0.0 {
            return self.psc.clone();
        }
        debug_assert_eq!(drive.len(), self.voltage.len());

        let psc_decay = (-dt / self.tau_psc).exp();
        // Unit-area impulse in discrete time: a spike's filtered response
        // sums to exactly 1/dt over future steps, so the steady-state mean
        // of the activity equals the spike rate at any step size.
        let kick = (1.0 - psc_decay) / dt;

        for i in 0..self.voltage.len() {
            self.psc[i] *= psc_decay;

            if self.refractory[i] > 0.0 {
                self.refractory[i] -= dt;
                self.voltage[i] = 0.0;
                continue;
            }

            let v = self.voltage[i] + dt / self.tau_rc * (drive[i] - self.voltage[i]);
            if v >= 1.0 {
                self.voltage[i] = 0.0;
                self.refractory[i] = self.tau_ref;
                self.psc[i] += kick;
            } else {
                self.voltage[i] = v.max(0.0);
            }
        }

        self.psc.clone()
    }

    fn reset(&mut self) {
        // Random initial voltages keep independent runs out of spike phase
        // lock with each other.
        let uniform = Uniform::new(0.0, 1.0);
        for v in self.voltage.iter_mut() {
            *v = uniform.sample(&mut self.rng);
        }
        self.refractory.fill(0.0);
        self.psc.fill(0.0);
    }
}

// ============================================================================
// Ensemble
// ============================================================================

/// A leaky integrate-and-fire population with solved tuning curves.
pub struct LifEnsemble {
    params: LifParameters,
    radii: Vec<f64>,
    /// Gain-scaled encoders divided by the per-dimension radius,
    /// `n_neurons x state_dim`.
    scaled_encoders: DMatrix<f64>,
    bias_current: DVector<f64>,
    origins: Vec<Box<dyn Origin>>,
    generator: LifSpikeGenerator,
    rng: StdRng,
}

impl LifEnsemble {
    /// Build an ensemble with sampled encoders, maximum rates and
    /// intercepts.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::EmptyRadii`] when `radii` is empty and
    /// [`PopulationError::InvalidParameter`] for non-positive radii, time
    /// constants, neuron counts, or a maximum rate the refractory period
    /// cannot support.
    pub fn new(
        n_neurons: usize,
        radii: Vec<f64>,
        params: LifParameters,
        seed: u64,
    ) -> PopulationResult<Self> {
        if radii.is_empty() {
            return Err(PopulationError::EmptyRadii);
        }
        if n_neurons == 0 {
            return Err(PopulationError::InvalidParameter {
                parameter: "n_neurons",
                reason: "must be positive".into(),
            });
        }
        for &r in &radii {
            if !r.is_finite() || r <= 0.0 {
                return Err(PopulationError::InvalidParameter {
                    parameter: "radii",
                    reason: format!("radius {r} must be positive and finite"),
                });
            }
        }
        for (name, value) in [
            ("tau_rc", params.tau_rc),
            ("tau_ref", params.tau_ref),
            ("tau_psc", params.tau_psc),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PopulationError::InvalidParameter {
                    parameter: name,
                    reason: format!("time constant {value} must be positive"),
                });
            }
        }
        if !(0.0 < params.max_rate_min && params.max_rate_min < params.max_rate_max) {
            return Err(PopulationError::InvalidParameter {
                parameter: "max_rate",
                reason: format!(
                    "range [{}, {}] must be positive and increasing",
                    params.max_rate_min, params.max_rate_max
                ),
            });
        }
        if params.max_rate_max >= 1.0 / params.tau_ref {
            return Err(PopulationError::InvalidParameter {
                parameter: "max_rate_max",
                reason: format!(
                    "rate {} is unreachable with refractory period {}",
                    params.max_rate_max, params.tau_ref
                ),
            });
        }
        if !(params.intercept_min < params.intercept_max
            && params.intercept_min > -1.0
            && params.intercept_max < 1.0)
        {
            return Err(PopulationError::InvalidParameter {
                parameter: "intercept",
                reason: format!(
                    "range [{}, {}] must lie inside (-1, 1)",
                    params.intercept_min, params.intercept_max
                ),
            });
        }

        let state_dim = radii.len();
        let mut rng = StdRng::seed_from_u64(seed);
        let rate_dist = Uniform::new(params.max_rate_min, params.max_rate_max);
        let intercept_dist = Uniform::new(params.intercept_min, params.intercept_max);

        let mut scaled_encoders = DMatrix::zeros(n_neurons, state_dim);
        let mut bias_current = DVector::zeros(n_neurons);

        for i in 0..n_neurons {
            let encoder = random_unit_vector(state_dim, &mut rng);
            let max_rate = rate_dist.sample(&mut rng);
            let intercept = intercept_dist.sample(&mut rng);

            // Drive current that produces the sampled maximum rate, from
            // inverting the static rate curve at rate = max_rate.
            let j_max = 1.0 / (1.0 - ((params.tau_ref - 1.0 / max_rate) / params.tau_rc).exp());
            let gain = (j_max - 1.0) / (1.0 - intercept);
            bias_current[i] = 1.0 - gain * intercept;

            for k in 0..state_dim {
                scaled_encoders[(i, k)] = gain * encoder[k] / radii[k];
            }
        }

        let generator = LifSpikeGenerator::new(
            n_neurons,
            params.tau_rc,
            params.tau_ref,
            params.tau_psc,
            seed.wrapping_add(1),
        );

        Ok(Self {
            params,
            radii,
            scaled_encoders,
            bias_current,
            origins: Vec::new(),
            generator,
            rng,
        })
    }

    /// Number of neurons.
    #[must_use]
    pub fn n_neurons(&self) -> usize {
        self.scaled_encoders.nrows()
    }

    /// Tuning and dynamics parameters.
    #[must_use]
    pub fn params(&self) -> &LifParameters {
        &self.params
    }

    /// Add a decoded origin computing `ideal` over the represented state.
    ///
    /// Decoders are solved immediately against `decoder_points` evaluation
    /// points sampled uniformly from the represented box.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::DimensionMismatch`] when `ideal` does not
    /// return `dim` values and [`PopulationError::DecoderSolve`] when the
    /// decoder solve fails.
    pub fn add_origin<F>(&mut self, name: &str, dim: usize, ideal: F) -> PopulationResult<()>
    where
        F: Fn(&DVector<f64>) -> DVector<f64> + Send + Sync + 'static,
    {
        let points = self.sample_eval_points(self.params.decoder_points);
        let activities = self.rates(&points);
        let ideal_fn: IdealFn = Arc::new(ideal);

        let mut targets = DMatrix::zeros(dim, points.ncols());
        for (j, col) in points.column_iter().enumerate() {
            let value = ideal_fn(&col.into_owned());
            if value.len() != dim {
                return Err(PopulationError::DimensionMismatch {
                    expected: dim,
                    got: value.len(),
                });
            }
            targets.set_column(j, &value);
        }

        let origin = DecodedOrigin::solve(
            name,
            dim,
            ideal_fn,
            &activities,
            &targets,
            self.params.decoder_regularization,
        )?;
        self.origins.push(Box::new(origin));
        Ok(())
    }

    fn sample_eval_points(&mut self, count: usize) -> DMatrix<f64> {
        let dists: Vec<Uniform<f64>> = self
            .radii
            .iter()
            .map(|&r| Uniform::new_inclusive(-r, r))
            .collect();
        DMatrix::from_fn(self.radii.len(), count, |i, _| {
            dists[i].sample(&mut self.rng)
        })
    }
}

impl Population for LifEnsemble {
    fn radii(&self) -> &[f64] {
        &self.radii
    }

    fn origins(&self) -> &[Box<dyn Origin>] {
        &self.origins
    }

    fn rates(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        debug_assert_eq!(points.nrows(), self.radii.len());
        let mut current = &self.scaled_encoders * points;
        for mut col in current.column_iter_mut() {
            col += &self.bias_current;
        }
        current.apply(|j| *j = lif_rate(*j, self.params.tau_rc, self.params.tau_ref));
        current
    }

    fn drive(&self, state: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(state.len(), self.radii.len());
        &self.scaled_encoders * state + &self.bias_current
    }

    fn spike_generator(&mut self) -> &mut dyn SpikeGenerator {
        &mut self.generator
    }

    fn reset(&mut self) {
        self.generator.reset();
    }
}

fn random_unit_vector(dim: usize, rng: &mut StdRng) -> DVector<f64> {
    loop {
        let v = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
        let norm = v.norm();
        if norm > 1e-9 {
            return v / norm;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_ensemble(n_neurons: usize, seed: u64) -> LifEnsemble {
        let mut ensemble =
            LifEnsemble::new(n_neurons, vec![1.0], LifParameters::default(), seed).unwrap();
        ensemble
            .add_origin("x", 1, |state: &DVector<f64>| state.clone())
            .unwrap();
        ensemble
    }

    #[test]
    fn test_lif_rate_curve() {
        let (tau_rc, tau_ref) = (0.02, 0.002);
        assert!(lif_rate(0.5, tau_rc, tau_ref).abs() < 1e-12);
        assert!(lif_rate(1.0, tau_rc, tau_ref).abs() < 1e-12);
        let low = lif_rate(1.5, tau_rc, tau_ref);
        let high = lif_rate(3.0, tau_rc, tau_ref);
        assert!(low > 0.0);
        assert!(high > low);
        // The refractory period caps the rate below 1/tau_ref.
        assert!(lif_rate(1e9, tau_rc, tau_ref) < 1.0 / tau_ref);
    }

    #[test]
    fn test_construction_validation() {
        let err = LifEnsemble::new(10, vec![], LifParameters::default(), 0);
        assert!(matches!(err, Err(PopulationError::EmptyRadii)));

        let err = LifEnsemble::new(0, vec![1.0], LifParameters::default(), 0);
        assert!(matches!(
            err,
            Err(PopulationError::InvalidParameter { parameter: "n_neurons", .. })
        ));

        let err = LifEnsemble::new(10, vec![-1.0], LifParameters::default(), 0);
        assert!(matches!(
            err,
            Err(PopulationError::InvalidParameter { parameter: "radii", .. })
        ));

        let params = LifParameters {
            max_rate_max: 600.0,
            ..LifParameters::default()
        };
        let err = LifEnsemble::new(10, vec![1.0], params, 0);
        assert!(matches!(
            err,
            Err(PopulationError::InvalidParameter { parameter: "max_rate_max", .. })
        ));
    }

    #[test]
    fn test_rates_shape_and_bounds() {
        let ensemble = identity_ensemble(50, 2);
        let points = DMatrix::from_row_slice(1, 5, &[-1.0, -0.5, 0.0, 0.5, 1.0]);
        let rates = ensemble.rates(&points);
        assert_eq!(rates.nrows(), 50);
        assert_eq!(rates.ncols(), 5);
        let cap = 1.0 / ensemble.params().tau_ref;
        for &r in rates.iter() {
            assert!(r >= 0.0);
            assert!(r < cap);
        }
    }

    #[test]
    fn test_identity_decode_accuracy() {
        let ensemble = identity_ensemble(80, 3);
        let xs: Vec<f64> = (0..21).map(|i| -0.8 + 1.6 * f64::from(i) / 20.0).collect();
        let points = DMatrix::from_row_slice(1, xs.len(), &xs);
        let rates = ensemble.rates(&points);
        let decoded = ensemble.origins()[0].decoders().transpose() * &rates;

        let mut total = 0.0;
        for (j, &x) in xs.iter().enumerate() {
            total += (decoded[(0, j)] - x).abs();
        }
        assert!(total / (xs.len() as f64) < 0.08);
    }

    #[test]
    fn test_spiking_activity_tracks_static_decode() {
        let mut ensemble = identity_ensemble(60, 11);
        let state = DVector::from_element(1, 0.4);

        let point = DMatrix::from_column_slice(1, 1, &[0.4]);
        let static_decoded =
            (ensemble.origins()[0].decoders().transpose() * ensemble.rates(&point))[(0, 0)];

        ensemble.reset();
        let drive = ensemble.drive(&state);
        let dt = 0.001;
        let mut t = 0.0;
        let mut sum = 0.0;
        let mut count = 0;
        for step in 0..1500 {
            let activity = ensemble.spike_generator().run(&drive, t, t + dt);
            if step >= 500 {
                sum += ensemble.origins()[0].decode(&activity)[0];
                count += 1;
            }
            t += dt;
        }
        let spiking_mean = sum / f64::from(count);
        assert!((spiking_mean - static_decoded).abs() < 0.1);
    }

    #[test]
    fn test_reset_desynchronizes_voltages() {
        let mut ensemble = identity_ensemble(20, 5);
        ensemble.reset();
        let generator = &ensemble.generator;
        let first = generator.voltage[0];
        assert!(generator.voltage.iter().any(|&v| (v - first).abs() > 1e-6));
        assert!(generator.psc.iter().all(|&p| p.abs() < 1e-12));
    }

    #[test]
    fn test_origin_dimension_mismatch_rejected() {
        let mut ensemble =
            LifEnsemble::new(30, vec![1.0], LifParameters::default(), 9).unwrap();
        let result = ensemble.add_origin("bad", 2, |state: &DVector<f64>| state.clone());
        assert!(matches!(
            result,
            Err(PopulationError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
