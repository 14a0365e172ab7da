//! Zero-order-hold discretization and block-diagonal filter assembly.
//!
//! Each fitted transfer function becomes a two-state discrete block; the
//! per-dimension blocks assemble into one block-diagonal system. Temporal
//! coupling across output dimensions is intentionally absent: spatial
//! correlation enters through the filter input covariance, never the filter
//! itself.

use nalgebra::{DMatrix, Matrix2, Matrix3, RowVector2, Vector2};

use crate::tf::TransferFunction;

/// One discretized two-state filter block.
#[derive(Clone, Debug)]
pub struct FilterBlock {
    /// Discrete state transition matrix.
    pub a: Matrix2<f64>,
    /// Discrete input matrix.
    pub b: Vector2<f64>,
    /// Output matrix, carried over from the continuous realization.
    pub c: RowVector2<f64>,
    /// Direct feedthrough gain.
    pub d: f64,
}

/// Discretize a transfer function with a zero-order hold on the input.
///
/// Uses the augmented-matrix exponential: the top rows of
/// `exp([[A, B], [0, 0]] * dt)` hold the discrete `(Ad, Bd)` pair exactly,
/// with no series truncation.
#[must_use]
pub fn zoh(tf: &TransferFunction, dt: f64) -> FilterBlock {
    let (a, b, c, d) = tf.to_state_space();

    let mut augmented = Matrix3::zeros();
    augmented.fixed_view_mut::<2, 2>(0, 0).copy_from(&(a * dt));
    augmented.fixed_view_mut::<2, 1>(0, 2).copy_from(&(b * dt));
    let exponential = augmented.exp();

    FilterBlock {
        a: exponential.fixed_view::<2, 2>(0, 0).into_owned(),
        b: exponential.fixed_view::<2, 1>(0, 2).into_owned(),
        c,
        d,
    }
}

/// Block-diagonal discrete state-space filter over all output dimensions.
///
/// For `D` output dimensions the shapes are `A: 2D x 2D`, `B: 2D x D`,
/// `C: D x 2D`, `D: D x D`, with exactly two internal states per output
/// dimension.
#[derive(Clone, Debug)]
pub struct DiscreteFilterSystem {
    /// State transition matrix.
    pub a: DMatrix<f64>,
    /// Input matrix.
    pub b: DMatrix<f64>,
    /// Output matrix.
    pub c: DMatrix<f64>,
    /// Feedthrough matrix (diagonal).
    pub d: DMatrix<f64>,
}

impl DiscreteFilterSystem {
    /// Assemble per-dimension blocks into one block-diagonal system.
    #[must_use]
    pub fn block_diagonal(blocks: &[FilterBlock]) -> Self {
        let n = blocks.len();
        let mut a = DMatrix::zeros(2 * n, 2 * n);
        let mut b = DMatrix::zeros(2 * n, n);
        let mut c = DMatrix::zeros(n, 2 * n);
        let mut d = DMatrix::zeros(n, n);

        for (i, block) in blocks.iter().enumerate() {
            a.view_mut((2 * i, 2 * i), (2, 2)).copy_from(&block.a);
            b.view_mut((2 * i, i), (2, 1)).copy_from(&block.b);
            c.view_mut((i, 2 * i), (1, 2)).copy_from(&block.c);
            d[(i, i)] = block.d;
        }

        Self { a, b, c, d }
    }

    /// Number of output dimensions.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.d.nrows()
    }

    /// Number of internal filter states.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }
}

// ============================================================================
// Tests
// ============================================================================
