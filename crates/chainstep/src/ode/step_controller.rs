//! Step-size control from error ratio history

use crate::physics::math::Scalar;
use std::fmt::Debug;

/// Maps error ratios (error estimate over tolerance) to step-size scale
/// factors
pub trait StepController: Send + Sync + Debug {
    /// Scale for the step following an accepted one. Records `ratio` in the
    /// history.
    fn accepted_scale(&mut self, ratio: Scalar, order: usize) -> Scalar;

    /// What [`StepController::accepted_scale`] would return, without
    /// recording `ratio`. Used to price table rows other than the accepted one.
    fn proposed_scale(&self, ratio: Scalar, order: usize) -> Scalar;

    /// Scale for retrying a rejected step. Always below one.
    fn rejected_scale(&self, ratio: Scalar, order: usize) -> Scalar;

    /// Forget the ratio history
    fn reset(&mut self);
}

/// Ratios below this are treated as this, so an exact step cannot poison the
/// history with a zero
const RATIO_FLOOR: Scalar = 1e-10;

/// PID step-size controller
///
/// For an accepted step with error ratio `r_n` and the two previous accepted
/// ratios `r_{n-1}`, `r_{n-2}`:
///
/// `scale = safety * r_n^(-k_i/p) * r_{n-1}^(k_p/p) * r_{n-2}^(-k_d/p)`
///
/// clamped to `[min_scale, max_scale]`, where `p` is the order of the error
/// estimate. With `k_p = k_d = 0` this is the classic integral controller.
///
/// A rejected step is retried with `safety * r^(-1/p)`, clamped to
/// `[min_scale, max_reject_scale]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    pub safety: Scalar,
    pub min_scale: Scalar,
    pub max_scale: Scalar,
    pub max_reject_scale: Scalar,
    pub k_i: Scalar,
    pub k_p: Scalar,
    pub k_d: Scalar,
    /// `[r_{n-1}, r_{n-2}]`
    history: [Scalar; 2],
}

impl Default for PidController {
    fn default() -> Self {
        Self::new(0.9, 0.2, 4.0, 0.7, 0.7, 0.4, 0.0)
    }
}

impl PidController {
    pub fn new(
        safety: Scalar,
        min_scale: Scalar,
        max_scale: Scalar,
        max_reject_scale: Scalar,
        k_i: Scalar,
        k_p: Scalar,
        k_d: Scalar,
    ) -> Self {
        Self {
            safety,
            min_scale,
            max_scale,
            max_reject_scale,
            k_i,
            k_p,
            k_d,
            history: [1.0, 1.0],
        }
    }

    pub fn history(&self) -> [Scalar; 2] {
        self.history
    }
}

impl StepController for PidController {
    fn accepted_scale(&mut self, ratio: Scalar, order: usize) -> Scalar {
        let scale = self.proposed_scale(ratio, order);
        self.history = [ratio.max(RATIO_FLOOR), self.history[0]];
        scale
    }

    fn proposed_scale(&self, ratio: Scalar, order: usize) -> Scalar {
        if ratio <= 0.0 {
            return self.max_scale;
        }

        let p = order.max(1) as Scalar;
        let [previous, before_previous] = self.history;
        let scale = self.safety
            * libm::pow(ratio.max(RATIO_FLOOR), -self.k_i / p)
            * libm::pow(previous, self.k_p / p)
            * libm::pow(before_previous, -self.k_d / p);
        if scale.is_finite() {
            scale.max(self.min_scale).min(self.max_scale)
        } else {
            self.min_scale
        }
    }

    fn rejected_scale(&self, ratio: Scalar, order: usize) -> Scalar {
        let p = order.max(1) as Scalar;
        let scale = self.safety * libm::pow(ratio, -1.0 / p);
        if scale.is_finite() {
            scale.max(self.min_scale).min(self.max_reject_scale)
        } else {
            self.min_scale.min(self.max_reject_scale)
        }
    }

    fn reset(&mut self) {
        self.history = [1.0, 1.0];
    }
}
