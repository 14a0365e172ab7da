//! Decoded origins: ideal functions paired with least-squares decoders.

use std::sync::Arc;

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::{PopulationError, PopulationResult};
use crate::population::Origin;

/// Ideal function of the represented state computed by an origin.
pub type IdealFn = Arc<dyn Fn(&DVector<f64>) -> DVector<f64> + Send + Sync>;

/// An output channel whose decoders are solved by regularized least squares.
///
/// Given activities `A` (`n_neurons x n_points`) sampled at evaluation
/// points and targets `F` (`dim x n_points`) from the ideal function, the
/// decoders minimize `|decoders^T A - F|^2` with ridge regularization on the
/// Gram matrix.
pub struct DecodedOrigin {
    name: String,
    dim: usize,
    ideal_fn: IdealFn,
    decoders: DMatrix<f64>,
}

impl DecodedOrigin {
    /// Solve decoders from sampled activities and ideal-function targets.
    ///
    /// `regularization` scales the ridge term relative to the mean diagonal
    /// of the Gram matrix; values around 1e-2 are typical for noisy spiking
    /// populations.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::DimensionMismatch`] when the activity and
    /// target shapes disagree and [`PopulationError::DecoderSolve`] when the
    /// regularized Gram matrix is not positive definite.
    pub fn solve(
        name: impl Into<String>,
        dim: usize,
        ideal_fn: IdealFn,
        activities: &DMatrix<f64>,
        targets: &DMatrix<f64>,
        regularization: f64,
    ) -> PopulationResult<Self> {
        let name = name.into();
        if targets.nrows() != dim {
            return Err(PopulationError::DimensionMismatch {
                expected: dim,
                got: targets.nrows(),
            });
        }
        if activities.ncols() != targets.ncols() || activities.ncols() == 0 {
            return Err(PopulationError::DimensionMismatch {
                expected: activities.ncols(),
                got: targets.ncols(),
            });
        }

        let n_neurons = activities.nrows();
        let n_points = activities.ncols() as f64;

        let mut gamma = (activities * activities.transpose()) / n_points;
        let ridge = regularization * gamma.trace() / n_neurons as f64;
        for i in 0..n_neurons {
            gamma[(i, i)] += ridge;
        }

        let cholesky = Cholesky::new(gamma).ok_or(PopulationError::DecoderSolve {
            origin: name.clone(),
        })?;
        let upsilon = (activities * targets.transpose()) / n_points;
        let decoders = cholesky.solve(&upsilon);

        Ok(Self {
            name,
            dim,
            ideal_fn,
            decoders,
        })
    }
}

impl Origin for DecodedOrigin {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn ideal(&self, points: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.dim, points.ncols());
        for (j, col) in points.column_iter().enumerate() {
            let value = (self.ideal_fn)(&col.into_owned());
            out.set_column(j, &value);
        }
        out
    }

    fn decoders(&self) -> &DMatrix<f64> {
        &self.decoders
    }
}

// ============================================================================
// Tests
// ============================================================================
