//! Reduce the difference between two state estimates to one number

use crate::physics::math::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Scaled error norm between two candidate states.
///
/// Each component difference is divided by `atol + rtol * max(|a_i|, |b_i|)`,
/// so a result of at most one means the candidates agree to tolerance.
pub trait ErrorEstimator: Send + Sync + Debug {
    /// # Panics
    /// Panics if `a` and `b` differ in length.
    fn estimate(&self, a: &[Scalar], b: &[Scalar], atol: Scalar, rtol: Scalar) -> Scalar;

    fn name(&self) -> &str;
}

#[inline]
fn scaled_errors<'a>(
    a: &'a [Scalar],
    b: &'a [Scalar],
    atol: Scalar,
    rtol: Scalar,
) -> impl Iterator<Item = Scalar> + 'a {
    assert_eq!(a.len(), b.len(), "estimates differ in length");
    a.iter().zip(b).map(move |(&x, &y)| {
        let scale = atol + rtol * x.abs().max(y.abs());
        (x - y).abs() / scale
    })
}

/// Root mean square of the scaled component errors
#[derive(Debug, Clone, Copy, Default)]
pub struct RmsNorm;

impl ErrorEstimator for RmsNorm {
    fn estimate(&self, a: &[Scalar], b: &[Scalar], atol: Scalar, rtol: Scalar) -> Scalar {
        if a.is_empty() {
            return 0.0;
        }
        let sum: Scalar = scaled_errors(a, b, atol, rtol).map(|e| e * e).sum();
        libm::sqrt(sum / a.len() as Scalar)
    }

    fn name(&self) -> &str {
        "rms"
    }
}

/// Largest scaled component error
#[derive(Debug, Clone, Copy, Default)]
pub struct WorstOffender;

impl ErrorEstimator for WorstOffender {
    fn estimate(&self, a: &[Scalar], b: &[Scalar], atol: Scalar, rtol: Scalar) -> Scalar {
        // NaN must survive the reduction so the caller sees it
        scaled_errors(a, b, atol, rtol).fold(0.0, |worst, e| {
            if e.is_nan() || worst.is_nan() {
                Scalar::NAN
            } else {
                worst.max(e)
            }
        })
    }

    fn name(&self) -> &str {
        "worst_offender"
    }
}

/// Configurable choice of estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    #[default]
    Rms,
    WorstOffender,
}

impl ErrorPolicy {
    pub fn estimator(self) -> Box<dyn ErrorEstimator> {
        match self {
            ErrorPolicy::Rms => Box::new(RmsNorm),
            ErrorPolicy::WorstOffender => Box::new(WorstOffender),
        }
    }
}
