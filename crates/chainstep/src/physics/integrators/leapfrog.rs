//! Second-order drift-kick-drift leapfrog

use super::{PhaseSpace, SymplecticStepper};
use crate::physics::math::Scalar;

/// Drift-kick-drift leapfrog
///
/// The elementary symmetric splitting every higher-order stepper is composed
/// from:
/// 1. x += v * dt/2
/// 2. v += a(x) * dt
/// 3. x += v * dt/2
///
/// Time-reversible and symplectic, second order, one force evaluation per
/// step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Leapfrog;

impl SymplecticStepper for Leapfrog {
    fn integrate(&self, state: &mut dyn PhaseSpace, step: Scalar) {
        let half_step = 0.5 * step;
        state.advance_position(half_step);
        state.advance_velocity(step);
        state.advance_position(half_step);
    }

    fn order(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "leapfrog"
    }

    fn aliases(&self) -> &[&str] {
        &["dkd", "verlet", "leapfrog2"]
    }

    fn clone_box(&self) -> Box<dyn SymplecticStepper> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::integrators::test_support::Oscillator;

    #[test]
    fn test_leapfrog_single_kick() {
        let mut state = Oscillator::new(1.0);
        Leapfrog.integrate(&mut state, 0.1);

        assert_eq!(state.kicks, 1);
        assert!((state.t - 0.1).abs() < 1e-15);
        // v = -x(h/2) * h with x(h/2) = 1
        assert!((state.v + 0.1).abs() < 1e-15);
        assert!((state.x - 0.995).abs() < 1e-15);
    }

    #[test]
    fn test_leapfrog_time_reversible() {
        let mut state = Oscillator::new(2.0);
        state.v = 0.3;
        let start = state;

        for _ in 0..50 {
            Leapfrog.integrate(&mut state, 0.01);
        }
        for _ in 0..50 {
            Leapfrog.integrate(&mut state, -0.01);
        }

        assert!((state.x - start.x).abs() < 1e-13);
        assert!((state.v - start.v).abs() < 1e-13);
    }

    #[test]
    fn test_leapfrog_energy_bounded() {
        let mut state = Oscillator::new(1.0);
        let initial = state.energy();
        for _ in 0..10_000 {
            Leapfrog.integrate(&mut state, 0.01);
        }
        // Energy oscillates at O(h²) without secular drift
        assert!((state.energy() - initial).abs() / initial < 1e-4);
    }
}
