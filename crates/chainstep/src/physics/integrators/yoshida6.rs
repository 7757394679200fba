//! Sixth-order composition

use super::{PhaseSpace, SymplecticStepper, compose};
use crate::physics::math::Scalar;

/// Sixth-order symplectic stepper (Yoshida solution A)
///
/// Seven leapfrog sub-steps `(w3, w2, w1, w0, w1, w2, w3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yoshida6;

impl Yoshida6 {
    const W1: Scalar = -1.177_679_984_178_87;
    const W2: Scalar = 0.235_573_213_359_357;
    const W3: Scalar = 0.784_513_610_477_560;
    const W0: Scalar = 1.0 - 2.0 * (Self::W1 + Self::W2 + Self::W3);

    const WEIGHTS: [Scalar; 7] = [
        Self::W3,
        Self::W2,
        Self::W1,
        Self::W0,
        Self::W1,
        Self::W2,
        Self::W3,
    ];
}

impl SymplecticStepper for Yoshida6 {
    fn integrate(&self, state: &mut dyn PhaseSpace, step: Scalar) {
        compose(state, step, &Self::WEIGHTS);
    }

    fn order(&self) -> usize {
        6
    }

    fn name(&self) -> &str {
        "yoshida6"
    }

    fn aliases(&self) -> &[&str] {
        &["leapfrog6"]
    }

    fn clone_box(&self) -> Box<dyn SymplecticStepper> {
        Box::new(*self)
    }
}
