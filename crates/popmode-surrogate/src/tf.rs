//! Second-order transfer functions fitted to noise spectra.

use nalgebra::{Matrix2, RowVector2, Vector2};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Continuous-time second-order transfer function
///
/// ```text
///          a2*s^2 + a1*s + a0
/// H(s) = ----------------------
///        s^2 + (w0/q)*s + w0^2
/// ```
///
/// Five parameters are enough to capture the band-passed look of decoded
/// spiking noise: numerator coefficients set the low-, mid- and
/// high-frequency gains while `w0` and `q` place the resonance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    /// Numerator constant coefficient
    pub a0: f64,
    /// Numerator first-order coefficient
    pub a1: f64,
    /// Numerator second-order coefficient
    pub a2: f64,
    /// Natural frequency (rad/s)
    pub w0: f64,
    /// Quality factor
    pub q: f64,
}

impl TransferFunction {
    /// Magnitude response `|H(j*omega)|` at an angular frequency (rad/s).
    #[must_use]
    pub fn magnitude_at(&self, omega: f64) -> f64 {
        let s = Complex::new(0.0, omega);
        let num = self.a2 * s * s + self.a1 * s + Complex::new(self.a0, 0.0);
        let den = s * s + (self.w0 / self.q) * s + Complex::new(self.w0 * self.w0, 0.0);
        (num / den).norm()
    }

    /// Controllable canonical state-space realization `(A, B, C, D)` with
    /// two internal states, satisfying `H(s) = C (sI - A)^-1 B + D`.
    #[must_use]
    pub fn to_state_space(&self) -> (Matrix2<f64>, Vector2<f64>, RowVector2<f64>, f64) {
        let d1 = self.w0 / self.q;
        let d0 = self.w0 * self.w0;
        let a = Matrix2::new(-d1, -d0, 1.0, 0.0);
        let b = Vector2::new(1.0, 0.0);
        let c = RowVector2::new(self.a1 - self.a2 * d1, self.a0 - self.a2 * d0);
        (a, b, c, self.a2)
    }

    /// A transfer function with zero gain everywhere, used for output
    /// dimensions whose noise estimate is degenerate (constant).
    #[must_use]
    pub fn zero_gain(w0: f64, q: f64) -> Self {
        Self {
            a0: 0.0,
            a1: 0.0,
            a2: 0.0,
            w0,
            q,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_anchors() {
        let tf = TransferFunction {
            a0: 2.0,
            a1: 0.0,
            a2: 0.0,
            w0: 100.0,
            q: 2.0,
        };
        // DC gain is a0 / w0^2.
        assert!((tf.magnitude_at(0.0) - 2.0 / 1e4).abs() < 1e-12);
        // At the natural frequency the real parts cancel, leaving
        // a0 / (w0^2 / q).
        assert!((tf.magnitude_at(100.0) - 2.0 * 2.0 / 1e4).abs() < 1e-12);
    }

    #[test]
    fn test_high_frequency_gain_approaches_a2() {
        let tf = TransferFunction {
            a0: 1.0,
            a1: 0.5,
            a2: 0.25,
            w0: 200.0,
            q: 1.5,
        };
        assert!((tf.magnitude_at(1e7) - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_state_space_matches_transfer_function() {
        let tf = TransferFunction {
            a0: 1.2,
            a1: 0.3,
            a2: 0.05,
            w0: 500.0,
            q: 2.0,
        };
        let (a, b, c, d) = tf.to_state_space();

        // Evaluate C (sI - A)^-1 B + D at s = j*omega using complex
        // matrices and compare against the closed form.
        for &omega in &[0.0, 100.0, 500.0, 2000.0] {
            let s = Complex::new(0.0, omega);
            let si_a = nalgebra::Matrix2::new(
                s - Complex::new(a[(0, 0)], 0.0),
                Complex::new(-a[(0, 1)], 0.0),
                Complex::new(-a[(1, 0)], 0.0),
                s - Complex::new(a[(1, 1)], 0.0),
            );
            let inv = si_a.try_inverse().unwrap();
            let bc = nalgebra::Vector2::new(Complex::new(b[0], 0.0), Complex::new(b[1], 0.0));
            let cc = nalgebra::RowVector2::new(Complex::new(c[0], 0.0), Complex::new(c[1], 0.0));
            let h = (cc * inv * bc)[(0, 0)] + Complex::new(d, 0.0);
            assert!((h.norm() - tf.magnitude_at(omega)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_gain_is_silent() {
        let tf = TransferFunction::zero_gain(100.0, 2.0);
        for &omega in &[0.0, 50.0, 1000.0] {
            assert!(tf.magnitude_at(omega).abs() < 1e-15);
        }
    }
}
