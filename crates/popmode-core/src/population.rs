//! Contracts a spiking population must satisfy to be fitted by a surrogate.
//!
//! The surrogate engine never touches neuron internals. It drives a
//! population through three narrow capabilities: batched noiseless rate
//! queries (for bias sampling), decoded output channels (for ideal values
//! and decoding weights), and a stateful spike generator (for Monte Carlo
//! noise estimation).

use nalgebra::{DMatrix, DVector};

/// A decoded output channel of a population.
///
/// An origin pairs an ideal function of the represented state with the
/// linear decoding weights that approximate it from neural activity.
pub trait Origin: Send {
    /// Channel name, unique within its population.
    fn name(&self) -> &str;

    /// Output dimensionality of this channel.
    fn dim(&self) -> usize;

    /// Ideal function values for a batch of states.
    ///
    /// `points` holds one state per column (`state_dim x n_points`); the
    /// result holds one output per column (`dim() x n_points`).
    fn ideal(&self, points: &DMatrix<f64>) -> DMatrix<f64>;

    /// Linear decoding weights, `n_neurons x dim()`.
    fn decoders(&self) -> &DMatrix<f64>;

    /// Decoded output for one instantaneous activity vector.
    fn decode(&self, activity: &DVector<f64>) -> DVector<f64> {
        self.decoders().transpose() * activity
    }
}

/// Stateful spiking dynamics of a population.
///
/// Calls must be made in increasing time order; the generator keeps
/// membrane, refractory and synaptic state between calls. Activity is the
/// post-synaptic-current-filtered spike train, so its steady-state mean
/// under constant drive matches the population's static rates.
pub trait SpikeGenerator: Send {
    /// Advance from `t_start` to `t_end` under constant per-neuron drive
    /// and return the activity vector at `t_end`.
    fn run(&mut self, drive: &DVector<f64>, t_start: f64, t_end: f64) -> DVector<f64>;

    /// Clear spiking state ahead of an independent run.
    fn reset(&mut self);
}

/// A spiking population as seen by the surrogate engine.
pub trait Population: Send {
    /// Per-dimension representational radius. Non-empty for a valid
    /// population.
    fn radii(&self) -> &[f64];

    /// Decoded output channels in a fixed order. Non-empty for a valid
    /// population.
    fn origins(&self) -> &[Box<dyn Origin>];

    /// Noiseless neural response rates for a batch of states.
    ///
    /// `points` holds one state per column (`state_dim x n_points`); the
    /// result is `n_neurons x n_points`.
    fn rates(&self, points: &DMatrix<f64>) -> DMatrix<f64>;

    /// Per-neuron drive current at a fixed represented state.
    fn drive(&self, state: &DVector<f64>) -> DVector<f64>;

    /// The population's spiking dynamics.
    fn spike_generator(&mut self) -> &mut dyn SpikeGenerator;

    /// Reset spiking state. Implementations may desynchronize membrane
    /// potentials so that independent runs do not share spike phase.
    fn reset(&mut self);

    /// Represented state dimensionality.
    fn state_dim(&self) -> usize {
        self.radii().len()
    }

    /// Total decoded output dimensionality across all origins.
    fn output_dim(&self) -> usize {
        self.origins().iter().map(|o| o.dim()).sum()
    }
}
