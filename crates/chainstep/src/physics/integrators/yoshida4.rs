//! Fourth-order composition (Forest-Ruth / Yoshida triple jump)

use super::{PhaseSpace, SymplecticStepper, compose};
use crate::physics::math::Scalar;

/// Fourth-order symplectic stepper
///
/// Three leapfrog sub-steps with weights `(w1, w0, w1)`, where
/// `w1 = 1 / (2 - 2^(1/3))` and `w0 = 1 - 2 w1`. The middle sub-step runs
/// backwards in time. Three force evaluations per step.
///
/// Reference: Yoshida (1990) "Construction of higher order symplectic
/// integrators", Phys. Lett. A 150, 262.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yoshida4;

impl Yoshida4 {
    const W1: Scalar = 1.351_207_191_959_657;
    const W0: Scalar = -1.702_414_383_919_315;

    const WEIGHTS: [Scalar; 3] = [Self::W1, Self::W0, Self::W1];
}

impl SymplecticStepper for Yoshida4 {
    fn integrate(&self, state: &mut dyn PhaseSpace, step: Scalar) {
        compose(state, step, &Self::WEIGHTS);
    }

    fn order(&self) -> usize {
        4
    }

    fn name(&self) -> &str {
        "yoshida4"
    }

    fn aliases(&self) -> &[&str] {
        &["forest_ruth", "leapfrog4"]
    }

    fn clone_box(&self) -> Box<dyn SymplecticStepper> {
        Box::new(*self)
    }
}
