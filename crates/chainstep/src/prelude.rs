//! Chainstep prelude module
//!
//! This module re-exports the most commonly used types and traits to reduce
//! import boilerplate.

pub use crate::physics::math::{Coordinates, Scalar, Vector};

// Config
pub use crate::config::{
    ControllerConfig, IntegratorConfig, OutputConfig, RunConfig, SimulationConfig, SystemConfig,
};

// Errors
pub use crate::error::{ChainstepError, Result};

// Physics
pub use crate::physics::chain::ChainState;
pub use crate::physics::diagnostics::Conserved;
pub use crate::physics::integrators::{PhaseSpace, StepperRegistry, SymplecticStepper};
pub use crate::physics::interaction::{
    ForceModel, Interaction, LinearDrag, NewtonianGravity, UniformField,
};
pub use crate::physics::particles::{Particle, ParticleSet};
pub use crate::physics::scenarios::Scenario;
pub use crate::physics::system::{ParticleSystem, RepresentationKind};

// Integration
pub use crate::ode::{BulirschStoer, ErrorPolicy, Integrable, StepOutcome};
pub use crate::observers::{Control, EnergyMonitor, Observer, SnapshotWriter, StepLimit};
pub use crate::simulation::{RunSummary, Simulation, StepInfo};
