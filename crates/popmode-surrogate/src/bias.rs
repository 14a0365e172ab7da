//! Batched decoded-bias sampling.
//!
//! Bias is the deterministic part of a population's decode error: the
//! noiseless decoded output minus the ideal function value. Sampling runs
//! one batched rate query for all grid points, then decodes per origin, so
//! the population is never stepped point by point.

use nalgebra::DMatrix;

use popmode_core::Population;

/// Decoded bias and ideal values sampled at a batch of states.
///
/// Both matrices are `output_dim x n_points`, rows ordered by origin.
pub struct BiasSample {
    /// `decoded - ideal` per output dimension and point.
    pub bias: DMatrix<f64>,
    /// Ideal function values per output dimension and point.
    pub ideal: DMatrix<f64>,
}

/// Map each output dimension to the index of the origin that owns it.
///
/// The result has one entry per total output dimension, in origin order, so
/// surrogate outputs can be scattered back to the population's channels.
pub fn origin_index_map<P: Population + ?Sized>(population: &P) -> Vec<usize> {
    let mut map = Vec::with_capacity(population.output_dim());
    for (index, origin) in population.origins().iter().enumerate() {
        map.extend(std::iter::repeat(index).take(origin.dim()));
    }
    map
}

/// Sample decoded bias and ideal values at the given states.
///
/// `points` holds one state per column. Rates are queried once for the whole
/// batch with spiking noise disabled, then every origin decodes the shared
/// rate matrix.
pub fn sample_bias<P: Population + ?Sized>(population: &P, points: &DMatrix<f64>) -> BiasSample {
    let rates = population.rates(points);
    let output_dim = population.output_dim();

    let mut bias = DMatrix::zeros(output_dim, points.ncols());
    let mut ideal = DMatrix::zeros(output_dim, points.ncols());

    let mut row = 0;
    for origin in population.origins() {
        let want = origin.ideal(points);
        let got = origin.decoders().transpose() * &rates;
        ideal.rows_mut(row, origin.dim()).copy_from(&want);
        bias.rows_mut(row, origin.dim()).copy_from(&(got - want));
        row += origin.dim();
    }

    BiasSample { bias, ideal }
}

// ============================================================================
// Tests
// ============================================================================
