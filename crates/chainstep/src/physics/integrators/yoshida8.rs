//! Eighth-order composition

use super::{PhaseSpace, SymplecticStepper, compose};
use crate::physics::math::Scalar;

/// Eighth-order symplectic stepper (Yoshida solution D)
///
/// Fifteen leapfrog sub-steps `(w7, ..., w1, w0, w1, ..., w7)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yoshida8;

impl Yoshida8 {
    const W1: Scalar = 0.102_799_849_391_985;
    const W2: Scalar = -1.960_610_232_975_49;
    const W3: Scalar = 1.938_139_137_622_76;
    const W4: Scalar = -0.158_240_635_368_243;
    const W5: Scalar = -1.444_852_236_860_48;
    const W6: Scalar = 0.253_693_336_566_229;
    const W7: Scalar = 0.914_844_246_229_740;
    const W0: Scalar =
        1.0 - 2.0 * (Self::W1 + Self::W2 + Self::W3 + Self::W4 + Self::W5 + Self::W6 + Self::W7);

    const WEIGHTS: [Scalar; 15] = [
        Self::W7,
        Self::W6,
        Self::W5,
        Self::W4,
        Self::W3,
        Self::W2,
        Self::W1,
        Self::W0,
        Self::W1,
        Self::W2,
        Self::W3,
        Self::W4,
        Self::W5,
        Self::W6,
        Self::W7,
    ];
}

impl SymplecticStepper for Yoshida8 {
    fn integrate(&self, state: &mut dyn PhaseSpace, step: Scalar) {
        compose(state, step, &Self::WEIGHTS);
    }

    fn order(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "yoshida8"
    }

    fn aliases(&self) -> &[&str] {
        &["leapfrog8"]
    }

    fn clone_box(&self) -> Box<dyn SymplecticStepper> {
        Box::new(*self)
    }
}
