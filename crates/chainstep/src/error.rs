//! Error type shared by the whole crate

use crate::physics::math::Scalar;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainstepError>;

#[derive(Error, Debug)]
pub enum ChainstepError {
    #[error("particle set is empty")]
    EmptySystem,

    #[error("particle {index} has invalid mass {mass} (must be finite and positive)")]
    InvalidMass { index: usize, mass: Scalar },

    #[error("particle {index} has a non-finite {quantity}")]
    NonFinite {
        index: usize,
        quantity: &'static str,
    },

    #[error("particle id {0} appears more than once")]
    DuplicateId(usize),

    #[error("mismatched array lengths: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("scalar buffer has {actual} entries, expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    /// Repeated rejections pushed the macro step below the configured floor.
    #[error(
        "step size {step:e} fell below the floor {floor:e} at t = {time} (last error ratio {error_ratio:e})"
    )]
    StepSizeUnderflow {
        /// Time of the last accepted state
        time: Scalar,
        /// Step size that would have been attempted next
        step: Scalar,
        floor: Scalar,
        error_ratio: Scalar,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    UnknownStepper(String),

    #[error("observer failed: {0}")]
    Observer(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl ChainstepError {
    /// Whether the error was raised before any integration work started.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            ChainstepError::EmptySystem
                | ChainstepError::InvalidMass { .. }
                | ChainstepError::NonFinite { .. }
                | ChainstepError::DuplicateId(_)
                | ChainstepError::LengthMismatch { .. }
        )
    }
}
