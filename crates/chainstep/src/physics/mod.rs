//! Particle state, chain coordinates, forces and the symplectic sub-steppers

pub mod chain;
pub mod diagnostics;
pub mod integrators;
pub mod interaction;
pub mod math;
pub mod particles;
pub mod scenarios;
pub mod system;
