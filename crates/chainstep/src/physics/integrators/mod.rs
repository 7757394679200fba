//! Fixed-step symplectic sub-steppers
//!
//! Every stepper is built from the drift-kick-drift leapfrog. Higher orders
//! compose leapfrog sub-steps with fixed weights and merge adjacent drifts, so
//! an `m`-stage composition costs `m` force evaluations.

use crate::physics::math::Scalar;
use std::fmt::Debug;

pub mod leapfrog;
pub mod registry;
pub mod yoshida4;
pub mod yoshida6;
pub mod yoshida8;

pub use leapfrog::Leapfrog;
pub use registry::StepperRegistry;
pub use yoshida4::Yoshida4;
pub use yoshida6::Yoshida6;
pub use yoshida8::Yoshida8;

/// State that can be split into a drift and a kick
pub trait PhaseSpace {
    /// Advance positions by `step` using the current velocities. Also advances
    /// the clock by `step`.
    fn advance_position(&mut self, step: Scalar);

    /// Advance velocities by `step` using accelerations evaluated at the
    /// current positions
    fn advance_velocity(&mut self, step: Scalar);
}

/// A fixed-order symplectic integration scheme
pub trait SymplecticStepper: Send + Sync + Debug {
    /// Advance `state` by one step of length `step`. Never fails; error
    /// control is the caller's concern.
    fn integrate(&self, state: &mut dyn PhaseSpace, step: Scalar);

    /// Order of accuracy of the global error
    fn order(&self) -> usize;

    /// Canonical registry name
    fn name(&self) -> &str;

    /// Alternative names accepted by the registry
    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn clone_box(&self) -> Box<dyn SymplecticStepper>;
}

impl Clone for Box<dyn SymplecticStepper> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Symmetric composition of leapfrog sub-steps with the given weights.
///
/// Weights must sum to one. Consecutive half drifts are merged, so the
/// sequence is `drift(w0/2)`, then for each weight `kick(w_i)` followed by a
/// drift of half the sum of this and the next weight.
pub(crate) fn compose(state: &mut dyn PhaseSpace, step: Scalar, weights: &[Scalar]) {
    let Some((&first, _)) = weights.split_first() else {
        return;
    };
    state.advance_position(0.5 * first * step);
    for (i, &weight) in weights.iter().enumerate() {
        state.advance_velocity(weight * step);
        let next = weights.get(i + 1).copied().unwrap_or(0.0);
        state.advance_position(0.5 * (weight + next) * step);
    }
}
