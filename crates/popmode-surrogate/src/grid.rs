//! State-space grids and the bias lookup table.
//!
//! The bias table trades memory for speed: decode error is sampled once on
//! a uniform grid over the represented region and answered at runtime by
//! clamped nearest-grid-point lookup, with no interpolation. Grid layout
//! shrinks with dimensionality, from a dense line in 1-D down to a single
//! norm-indexed radial axis above 3-D.

use nalgebra::{DMatrix, DVector};

use crate::config::GridConfig;
use crate::error::{ModelError, ModelResult};

// ============================================================================
// Axis
// ============================================================================

/// A uniformly spaced, strictly increasing axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    first: f64,
    step: f64,
    len: usize,
}

impl Axis {
    /// Axis symmetric about zero spanning `[-extent, extent]`.
    #[must_use]
    pub fn symmetric(extent: f64, len: usize) -> Self {
        debug_assert!(len >= 2);
        debug_assert!(extent > 0.0);
        Self {
            first: -extent,
            step: 2.0 * extent / (len - 1) as f64,
            len,
        }
    }

    /// Axis spanning `[0, extent]`.
    #[must_use]
    pub fn radial(extent: f64, len: usize) -> Self {
        debug_assert!(len >= 2);
        debug_assert!(extent > 0.0);
        Self {
            first: 0.0,
            step: extent / (len - 1) as f64,
            len,
        }
    }

    /// Number of grid points on the axis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the axis has no points. Constructed axes never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spacing between adjacent grid points.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Coordinate of the `i`-th grid point.
    #[must_use]
    pub fn value(&self, i: usize) -> f64 {
        debug_assert!(i < self.len);
        self.first + self.step * i as f64
    }

    /// Index of the grid point nearest to `x`, clamped to the axis.
    ///
    /// Out-of-range coordinates snap to the boundary, so lookups never fail;
    /// the table extrapolates with its edge values.
    #[must_use]
    pub fn index_of(&self, x: f64) -> usize {
        let raw = ((x - self.first) / self.step).round();
        let clamped = raw.clamp(0.0, (self.len - 1) as f64);
        clamped as usize
    }
}

// ============================================================================
// Grid variants
// ============================================================================

/// Sampling grid over a population's represented region.
///
/// Each variant carries its own axis data; all share the same sample-point
/// and lookup interface. The variant is chosen from the state
/// dimensionality, never by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum BiasGrid {
    /// Dense line for one-dimensional populations.
    Line {
        /// The single state axis.
        x: Axis,
    },
    /// Cartesian product grid for two-dimensional populations.
    Mesh2d {
        /// First state axis.
        x: Axis,
        /// Second state axis.
        y: Axis,
    },
    /// Cartesian product grid for three-dimensional populations.
    Mesh3d {
        /// First state axis.
        x: Axis,
        /// Second state axis.
        y: Axis,
        /// Third state axis.
        z: Axis,
    },
    /// Norm-indexed radial axis for higher-dimensional populations.
    Radial {
        /// Axis over the state norm.
        r: Axis,
        /// Dimensionality of the represented state.
        state_dim: usize,
    },
}

impl BiasGrid {
    /// Choose a grid for the given per-dimension radii.
    ///
    /// Axis extents are `config.radius_factor` times the radius. Above three
    /// dimensions the represented region is assumed radially symmetric and
    /// sampled along the first axis only.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyRadii`] when `radii` is empty.
    pub fn for_radii(radii: &[f64], config: &GridConfig) -> ModelResult<Self> {
        let a = config.radius_factor;
        match radii {
            [] => Err(ModelError::EmptyRadii),
            [r] => Ok(Self::Line {
                x: Axis::symmetric(a * r, config.line_points),
            }),
            [rx, ry] => Ok(Self::Mesh2d {
                x: Axis::symmetric(a * rx, config.mesh2d_points),
                y: Axis::symmetric(a * ry, config.mesh2d_points),
            }),
            [rx, ry, rz] => Ok(Self::Mesh3d {
                x: Axis::symmetric(a * rx, config.mesh3d_points),
                y: Axis::symmetric(a * ry, config.mesh3d_points),
                z: Axis::symmetric(a * rz, config.mesh3d_points),
            }),
            // TODO: scale the radial axis per dimension instead of assuming
            // radii[0] applies isotropically; anisotropic radii currently
            // fall back to the first entry.
            [r0, ..] => Ok(Self::Radial {
                r: Axis::radial(a * r0, config.radial_points),
                state_dim: radii.len(),
            }),
        }
    }

    /// Dimensionality of the states this grid samples.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        match self {
            Self::Line { .. } => 1,
            Self::Mesh2d { .. } => 2,
            Self::Mesh3d { .. } => 3,
            Self::Radial { state_dim, .. } => *state_dim,
        }
    }

    /// Total number of grid points.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Line { x } => x.len(),
            Self::Mesh2d { x, y } => x.len() * y.len(),
            Self::Mesh3d { x, y, z } => x.len() * y.len() * z.len(),
            Self::Radial { r, .. } => r.len(),
        }
    }

    /// True when the grid has no points. Constructed grids never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All grid points as one batch, one state per column.
    ///
    /// Column order defines the flattened table layout: the first axis is
    /// outermost and the last axis varies fastest, matching
    /// [`BiasGrid::flat_index`]. Radial grids emit points along the first
    /// axis with all other coordinates zero.
    #[must_use]
    pub fn sample_points(&self) -> DMatrix<f64> {
        match self {
            Self::Line { x } => DMatrix::from_fn(1, x.len(), |_, j| x.value(j)),
            Self::Mesh2d { x, y } => {
                let ny = y.len();
                DMatrix::from_fn(2, x.len() * ny, |i, col| {
                    if i == 0 {
                        x.value(col / ny)
                    } else {
                        y.value(col % ny)
                    }
                })
            }
            Self::Mesh3d { x, y, z } => {
                let (ny, nz) = (y.len(), z.len());
                DMatrix::from_fn(3, x.len() * ny * nz, |i, col| match i {
                    0 => x.value(col / (ny * nz)),
                    1 => y.value((col / nz) % ny),
                    _ => z.value(col % nz),
                })
            }
            Self::Radial { r, state_dim } => DMatrix::from_fn(*state_dim, r.len(), |i, j| {
                if i == 0 {
                    r.value(j)
                } else {
                    0.0
                }
            }),
        }
    }

    /// Flattened index of the grid point nearest to `state`.
    ///
    /// Coordinates outside the grid clamp to the nearest edge. `state` must
    /// have [`BiasGrid::state_dim`] entries.
    #[must_use]
    pub fn flat_index(&self, state: &[f64]) -> usize {
        debug_assert_eq!(state.len(), self.state_dim());
        match self {
            Self::Line { x } => x.index_of(state[0]),
            Self::Mesh2d { x, y } => x.index_of(state[0]) * y.len() + y.index_of(state[1]),
            Self::Mesh3d { x, y, z } => {
                (x.index_of(state[0]) * y.len() + y.index_of(state[1])) * z.len()
                    + z.index_of(state[2])
            }
            Self::Radial { r, .. } => {
                let norm = state.iter().map(|v| v * v).sum::<f64>().sqrt();
                r.index_of(norm)
            }
        }
    }
}

// ============================================================================
// Bias table
// ============================================================================

/// Gridded bias values with clamped nearest-point lookup.
///
/// Values are stored one output dimension per row and one grid point per
/// column, in the exact column order [`BiasGrid::sample_points`] emits.
#[derive(Clone, Debug)]
pub struct BiasTable {
    grid: BiasGrid,
    values: DMatrix<f64>,
}

impl BiasTable {
    /// Pair a grid with sampled values.
    ///
    /// # Panics
    ///
    /// Panics when the column count does not match the grid size; the two
    /// always come from the same sampling pass.
    #[must_use]
    pub fn new(grid: BiasGrid, values: DMatrix<f64>) -> Self {
        assert_eq!(
            values.ncols(),
            grid.len(),
            "bias values must cover every grid point"
        );
        Self { grid, values }
    }

    /// The underlying grid.
    #[must_use]
    pub fn grid(&self) -> &BiasGrid {
        &self.grid
    }

    /// Number of output dimensions per grid point.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.values.nrows()
    }

    /// Bias at the grid point nearest to `state`. Never fails; out-of-range
    /// states return the nearest edge value.
    #[must_use]
    pub fn lookup(&self, state: &[f64]) -> DVector<f64> {
        self.values.column(self.grid.flat_index(state)).into_owned()
    }

    /// Bias column at a raw flattened index, for diagnostics.
    #[must_use]
    pub fn column(&self, index: usize) -> DVector<f64> {
        self.values.column(index).into_owned()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn default_grid(radii: &[f64]) -> BiasGrid {
        BiasGrid::for_radii(radii, &GridConfig::default()).unwrap()
    }

    #[test]
    fn test_line_axis_is_symmetric_and_uniform() {
        let grid = default_grid(&[1.0]);
        let BiasGrid::Line { x } = &grid else {
            panic!("expected a line grid");
        };
        assert_eq!(x.len(), 301);
        assert!((x.value(0) + 3.0).abs() < 1e-12);
        assert!((x.value(300) - 3.0).abs() < 1e-12);
        assert!(x.value(150).abs() < 1e-12);
        for i in 1..x.len() {
            let step = x.value(i) - x.value(i - 1);
            assert!(step > 0.0);
            assert!((step - x.step()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mesh_axes_follow_per_dimension_radii() {
        let grid = default_grid(&[1.0, 2.0]);
        let BiasGrid::Mesh2d { x, y } = &grid else {
            panic!("expected a 2-D mesh");
        };
        assert_eq!(x.len(), 101);
        assert_eq!(y.len(), 101);
        assert!((x.value(0) + 3.0).abs() < 1e-12);
        assert!((y.value(0) + 6.0).abs() < 1e-12);
        assert!((y.value(100) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_lookup_clamps_out_of_range_states() {
        let grid = default_grid(&[1.0]);
        assert_eq!(grid.flat_index(&[-100.0]), 0);
        assert_eq!(grid.flat_index(&[100.0]), 300);
        assert_eq!(grid.flat_index(&[3.0]), grid.flat_index(&[100.0]));
    }

    #[test]
    fn test_sample_order_matches_flat_index() {
        for radii in [vec![1.0], vec![1.0, 0.5], vec![1.0, 2.0, 0.5]] {
            let config = GridConfig {
                mesh3d_points: 7,
                mesh2d_points: 9,
                line_points: 11,
                ..GridConfig::default()
            };
            let grid = BiasGrid::for_radii(&radii, &config).unwrap();
            let points = grid.sample_points();
            assert_eq!(points.ncols(), grid.len());
            for col in 0..points.ncols() {
                let state: Vec<f64> = points.column(col).iter().copied().collect();
                assert_eq!(grid.flat_index(&state), col);
            }
        }
    }

    #[test]
    fn test_radial_grid_uses_state_norm() {
        let grid = default_grid(&[2.0, 2.0, 2.0, 2.0, 2.0]);
        let BiasGrid::Radial { r, state_dim } = &grid else {
            panic!("expected a radial grid");
        };
        assert_eq!(*state_dim, 5);
        assert_eq!(r.len(), 201);
        assert!((r.value(0)).abs() < 1e-12);
        assert!((r.value(200) - 6.0).abs() < 1e-12);

        // A state of norm 5 indexes the same point regardless of direction.
        let a = grid.flat_index(&[3.0, 4.0, 0.0, 0.0, 0.0]);
        let b = grid.flat_index(&[0.0, 0.0, 0.0, 3.0, 4.0]);
        assert_eq!(a, b);
        assert_eq!(a, r.index_of(5.0));

        // Points hold the norm on the first coordinate only.
        let points = grid.sample_points();
        assert_eq!(points.nrows(), 5);
        for col in 0..points.ncols() {
            for row in 1..5 {
                assert!(points[(row, col)].abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_table_lookup_returns_stored_column() {
        let grid = default_grid(&[1.0]);
        let values = DMatrix::from_fn(2, grid.len(), |i, j| (i * 1000 + j) as f64);
        let table = BiasTable::new(grid, values);

        let mid = table.lookup(&[0.0]);
        assert!((mid[0] - 150.0).abs() < 1e-12);
        assert!((mid[1] - 1150.0).abs() < 1e-12);

        // Clamped lookups reuse the edge column.
        let far = table.lookup(&[10.0]);
        let edge = table.lookup(&[3.0]);
        assert_eq!(far, edge);
    }

    #[test]
    fn test_empty_radii_are_rejected() {
        let result = BiasGrid::for_radii(&[], &GridConfig::default());
        assert!(matches!(result, Err(ModelError::EmptyRadii)));
    }
}
