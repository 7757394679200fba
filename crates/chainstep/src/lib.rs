//! Chainstep library
//!
//! Adaptive Bulirsch–Stoer integration of gravitational N-body systems in
//! chain coordinates. The binary is a thin driver over this library.

pub mod cli;
pub mod config;
pub mod error;
pub mod observers;
pub mod ode;
pub mod physics;
pub mod prelude;
pub mod simulation;
