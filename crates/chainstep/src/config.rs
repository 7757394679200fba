use crate::error::{ChainstepError, Result};
use crate::ode::{ErrorPolicy, PidController};
use crate::physics::interaction::{ForceModel, LinearDrag, NewtonianGravity, UniformField};
use crate::physics::math::{Scalar, Vector};
use crate::physics::scenarios::Scenario;
use crate::physics::system::RepresentationKind;
use chainstep_macros::ConfigDefaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Prefix of environment variables that override configuration values,
/// e.g. `CHAINSTEP__INTEGRATOR__RTOL=1e-10`
pub const ENV_PREFIX: &str = "CHAINSTEP";

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    #[default]
    pub integrator: IntegratorConfig,

    #[default]
    pub system: SystemConfig,

    #[default]
    pub run: RunConfig,

    #[default]
    pub output: OutputConfig,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Relative tolerance of the extrapolation error estimate
    #[default(1e-12)]
    pub rtol: Scalar,

    /// Absolute tolerance; `rtol` when unset
    #[default(None)]
    pub atol: Option<Scalar>,

    /// Smallest macro step tried before giving up
    #[default(1e-13)]
    pub step_floor: Scalar,

    #[default(8)]
    pub max_table_rows: usize,

    /// Sub-step counts per extrapolation row (Bulirsch sequence)
    #[default([2, 4, 6, 8, 12, 16, 24, 32])]
    pub sequence: Vec<usize>,

    /// Order of the symplectic sub-stepper
    #[default(2)]
    pub order: usize,

    #[default(ErrorPolicy::Rms)]
    pub error_policy: ErrorPolicy,

    /// First macro step; estimated from the initial conditions when unset
    #[default(None)]
    pub initial_step: Option<Scalar>,

    #[default]
    pub controller: ControllerConfig,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    #[default(0.9)]
    pub safety: Scalar,

    #[default(0.2)]
    pub min_scale: Scalar,

    #[default(4.0)]
    pub max_scale: Scalar,

    /// Upper bound of the contraction applied after a rejection
    #[default(0.7)]
    pub max_reject_scale: Scalar,

    #[default(0.7)]
    pub k_i: Scalar,

    #[default(0.4)]
    pub k_p: Scalar,

    #[default(0.0)]
    pub k_d: Scalar,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    #[default(RepresentationKind::ChainAware)]
    pub representation: RepresentationKind,

    #[default(1.0)]
    pub gravitational_constant: Scalar,

    /// Linear drag coefficient, `a = -k v`
    #[default(None)]
    pub drag: Option<Scalar>,

    /// Constant external acceleration
    #[default(None)]
    pub uniform_field: Option<[Scalar; 3]>,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    #[default(Scenario::TwoBody)]
    pub scenario: Scenario,

    /// Particle count for the random cluster
    #[default(16)]
    pub body_count: usize,

    #[default(42)]
    pub seed: u64,

    /// Eccentricity of the two-body orbit
    #[default(0.5)]
    pub eccentricity: Scalar,

    #[default(100.0)]
    pub end_time: Scalar,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV file receiving snapshots; no snapshots when unset
    #[default(None)]
    pub snapshot_path: Option<String>,

    #[default(1000)]
    pub snapshot_count: usize,
}

impl IntegratorConfig {
    pub fn atol(&self) -> Scalar {
        self.atol.unwrap_or(self.rtol)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ChainstepError::InvalidConfig(message));

        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return invalid(format!("rtol must be positive and finite, got {}", self.rtol));
        }
        let atol = self.atol();
        if !(atol.is_finite() && atol > 0.0) {
            return invalid(format!("atol must be positive and finite, got {atol}"));
        }
        if !(self.step_floor.is_finite() && self.step_floor > 0.0) {
            return invalid(format!(
                "step_floor must be positive and finite, got {}",
                self.step_floor
            ));
        }
        if self.sequence.is_empty() {
            return invalid("sequence must not be empty".to_string());
        }
        if self.sequence.contains(&0) {
            return invalid("sequence must not contain zero".to_string());
        }
        if self.sequence.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!(
                "sequence must be strictly increasing, got {:?}",
                self.sequence
            ));
        }
        if self.max_table_rows < 2 || self.max_table_rows > self.sequence.len() {
            return invalid(format!(
                "max_table_rows must be between 2 and the sequence length ({}), got {}",
                self.sequence.len(),
                self.max_table_rows
            ));
        }
        if !matches!(self.order, 2 | 4 | 6 | 8) {
            return invalid(format!("order must be 2, 4, 6 or 8, got {}", self.order));
        }
        if let Some(step) = self.initial_step
            && !(step.is_finite() && step > 0.0)
        {
            return invalid(format!("initial_step must be positive and finite, got {step}"));
        }
        self.controller.validate()
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(ChainstepError::InvalidConfig(message));
        let values = [
            ("safety", self.safety),
            ("min_scale", self.min_scale),
            ("max_scale", self.max_scale),
            ("max_reject_scale", self.max_reject_scale),
        ];
        for (name, value) in values {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("controller.{name} must be positive and finite, got {value}"));
            }
        }
        if self.max_reject_scale >= 1.0 {
            return invalid(format!(
                "controller.max_reject_scale must be below 1, got {}",
                self.max_reject_scale
            ));
        }
        if self.min_scale > self.max_scale {
            return invalid(format!(
                "controller.min_scale ({}) exceeds max_scale ({})",
                self.min_scale, self.max_scale
            ));
        }
        if self.min_scale > self.max_reject_scale {
            return invalid(format!(
                "controller.min_scale ({}) exceeds max_reject_scale ({})",
                self.min_scale, self.max_reject_scale
            ));
        }
        if ![self.k_i, self.k_p, self.k_d].iter().all(|k| k.is_finite()) {
            return invalid("controller gains must be finite".to_string());
        }
        Ok(())
    }

    pub fn controller(&self) -> PidController {
        PidController::new(
            self.safety,
            self.min_scale,
            self.max_scale,
            self.max_reject_scale,
            self.k_i,
            self.k_p,
            self.k_d,
        )
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        let g = self.gravitational_constant;
        if !(g.is_finite() && g > 0.0) {
            return Err(ChainstepError::InvalidConfig(format!(
                "gravitational_constant must be positive and finite, got {g}"
            )));
        }
        if let Some(k) = self.drag
            && !(k.is_finite() && k >= 0.0)
        {
            return Err(ChainstepError::InvalidConfig(format!(
                "drag must be non-negative and finite, got {k}"
            )));
        }
        if let Some(field) = self.uniform_field
            && !field.iter().all(|c| c.is_finite())
        {
            return Err(ChainstepError::InvalidConfig(
                "uniform_field must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn force_model(&self) -> ForceModel {
        let mut forces = ForceModel::new(NewtonianGravity::new(self.gravitational_constant));
        if let Some([x, y, z]) = self.uniform_field {
            forces = forces.with_perturbation(UniformField {
                acceleration: Vector::new(x, y, z),
            });
        }
        if let Some(coefficient) = self.drag {
            forces = forces.with_perturbation(LinearDrag { coefficient });
        }
        forces
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.end_time.is_finite() && self.end_time > 0.0) {
            return Err(ChainstepError::InvalidConfig(format!(
                "end_time must be positive and finite, got {}",
                self.end_time
            )));
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(ChainstepError::InvalidConfig(format!(
                "eccentricity must be in [0, 1), got {}",
                self.eccentricity
            )));
        }
        if self.scenario == Scenario::RandomCluster && self.body_count < 2 {
            return Err(ChainstepError::InvalidConfig(format!(
                "body_count must be at least 2, got {}",
                self.body_count
            )));
        }
        Ok(())
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        self.integrator.validate()?;
        self.system.validate()?;
        self.run.validate()?;
        if self.output.snapshot_path.is_some() && self.output.snapshot_count == 0 {
            return Err(ChainstepError::InvalidConfig(
                "snapshot_count must be positive when snapshots are written".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a file, falling back to defaults if the file doesn't exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                info!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    /// Location of the per-user configuration file
    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chainstep")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Per-user configuration file (optional) overlaid with `CHAINSTEP__*`
    /// environment variables
    pub fn load_from_user_config() -> Result<Self> {
        Self::load_layered(Self::user_config_path(), false)
    }

    /// The given file overlaid with `CHAINSTEP__*` environment variables. The
    /// file must exist.
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_layered(Some(path.as_ref().to_path_buf()), true)
    }

    fn load_layered(path: Option<PathBuf>, required: bool) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(required));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.integrator.sequence, vec![2, 4, 6, 8, 12, 16, 24, 32]);
        assert_eq!(config.integrator.atol(), 1e-12);
        assert_eq!(config.system.representation, RepresentationKind::ChainAware);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SimulationConfig = toml::from_str(
            r#"
            [integrator]
            rtol = 1e-9
            order = 4
            error_policy = "worst_offender"

            [system]
            representation = "plain_cartesian"
            drag = 0.01
            "#,
        )
        .unwrap();

        assert_eq!(config.integrator.rtol, 1e-9);
        assert_eq!(config.integrator.order, 4);
        assert_eq!(config.integrator.error_policy, ErrorPolicy::WorstOffender);
        assert_eq!(config.integrator.max_table_rows, 8);
        assert_eq!(config.system.representation, RepresentationKind::PlainCartesian);
        assert!(config.system.force_model().velocity_dependent());
        assert_eq!(config.run, RunConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_sequences() {
        let mut config = IntegratorConfig {
            sequence: vec![2, 4, 4, 8],
            max_table_rows: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.sequence = vec![0, 2, 4];
        config.max_table_rows = 3;
        assert!(config.validate().is_err());

        config.sequence = vec![];
        assert!(config.validate().is_err());

        config.sequence = vec![2, 4, 6];
        config.max_table_rows = 4;
        assert!(config.validate().is_err());

        config.max_table_rows = 1;
        assert!(config.validate().is_err());

        config.max_table_rows = 3;
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_tolerances_and_orders() {
        let bad = [
            IntegratorConfig {
                rtol: 0.0,
                ..Default::default()
            },
            IntegratorConfig {
                atol: Some(Scalar::NAN),
                ..Default::default()
            },
            IntegratorConfig {
                step_floor: -1.0,
                ..Default::default()
            },
            IntegratorConfig {
                order: 3,
                ..Default::default()
            },
            IntegratorConfig {
                initial_step: Some(0.0),
                ..Default::default()
            },
        ];
        for config in bad {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ChainstepError::InvalidConfig(_)), "{err}");
        }
    }

    #[test]
    fn test_validation_rejects_growing_rejections() {
        let mut config = ControllerConfig {
            max_reject_scale: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_reject_scale = 0.5;
        config.min_scale = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_force_model_from_system_config() {
        let config = SystemConfig {
            uniform_field: Some([0.0, 0.0, -9.8]),
            ..Default::default()
        };
        let forces = config.force_model();
        assert_eq!(forces.perturbations().len(), 1);
        assert!(!forces.velocity_dependent());
        assert_eq!(forces.gravity().gravitational_constant, 1.0);
    }

    #[test]
    fn test_save_and_reload() {
        let mut config = SimulationConfig::default();
        config.integrator.order = 6;
        config.output.snapshot_path = Some("out.csv".to_string());

        let path = std::env::temp_dir().join(format!("chainstep-config-{}.toml", std::process::id()));
        config.save(&path).unwrap();
        let reloaded = SimulationConfig::load_or_default(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = SimulationConfig::load_or_default("/nonexistent/chainstep.toml");
        assert_eq!(config, SimulationConfig::default());
    }
}
