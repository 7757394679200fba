//! Adaptive extrapolation integration
//!
//! The [`BulirschStoer`] integrator treats the dynamical state as an opaque
//! vector of scalars, repeatedly integrates it with a symplectic sub-stepper
//! at increasing resolution, and extrapolates the results to zero sub-step
//! size.

use crate::error::Result;
use crate::physics::integrators::PhaseSpace;
use crate::physics::math::Scalar;

pub mod bulirsch_stoer;
pub mod error_estimator;
pub mod step_controller;

pub use bulirsch_stoer::{BulirschStoer, IntegratorStats, StepOutcome};
pub use error_estimator::{ErrorEstimator, ErrorPolicy, RmsNorm, WorstOffender};
pub use step_controller::{PidController, StepController};

/// State the extrapolation integrator can save, restore and advance
pub trait Integrable: PhaseSpace {
    fn time(&self) -> Scalar;

    fn set_time(&mut self, time: Scalar);

    /// Length of the flattened state, time included
    fn scalar_len(&self) -> usize;

    /// Flatten the state into `out`, replacing its contents. The first entry
    /// is the time.
    fn write_scalars(&self, out: &mut Vec<Scalar>);

    /// Restore the state from a buffer written by
    /// [`Integrable::write_scalars`]
    fn read_scalars(&mut self, scalars: &[Scalar]) -> Result<()>;

    /// Called once before each macro step, before the state is saved
    fn pre_step(&mut self) {}

    /// Called after each accepted macro step
    fn post_step(&mut self) {}
}
