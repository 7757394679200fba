use chainstep_macros::ConfigDefaults;

#[test]
fn test_plain_defaults() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct ToleranceConfig {
        #[default(1e-12)]
        pub rtol: f64,

        #[default(8)]
        pub max_table_rows: usize,

        #[default(None)]
        pub atol: Option<f64>,

        #[default(1.0 / 3.0)]
        pub fraction: f64,
    }

    let config = ToleranceConfig::default();
    assert_eq!(config.rtol, 1e-12);
    assert_eq!(config.max_table_rows, 8);
    assert_eq!(config.atol, None);
    assert!((config.fraction - 0.333_333_333_333_333_3).abs() < 1e-15);
}

#[test]
fn test_vec_from_array_literal() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct SequenceConfig {
        #[default([2, 4, 6, 8, 12, 16, 24, 32])]
        pub sequence: Vec<usize>,

        #[default(vec![0.5, 0.25])]
        pub weights: Vec<f64>,
    }

    let config = SequenceConfig::default();
    assert_eq!(config.sequence, vec![2, 4, 6, 8, 12, 16, 24, 32]);
    assert_eq!(config.weights, vec![0.5, 0.25]);
}

#[test]
fn test_string_conversions() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct OutputConfig {
        #[default("two_body")]
        pub scenario: String,

        #[default(format!("run-{}", 7))]
        pub label: String,

        #[default("snapshots.csv")]
        pub snapshot_path: Option<String>,

        #[default(None)]
        pub checkpoint_path: Option<String>,

        #[default(Some(String::from("explicit")))]
        pub explicit: Option<String>,
    }

    let config = OutputConfig::default();
    assert_eq!(config.scenario, "two_body");
    assert_eq!(config.label, "run-7");
    assert_eq!(config.snapshot_path.as_deref(), Some("snapshots.csv"));
    assert_eq!(config.checkpoint_path, None);
    assert_eq!(config.explicit.as_deref(), Some("explicit"));
}

#[test]
fn test_nested_and_enum_defaults() {
    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Policy {
        Rms,
        #[allow(dead_code)]
        WorstOffender,
    }

    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct ControllerConfig {
        #[default(0.9)]
        pub safety: f64,
    }

    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct IntegratorConfig {
        #[default(Policy::Rms)]
        pub policy: Policy,

        #[default]
        pub controller: ControllerConfig,

        #[default]
        pub sequence: Vec<usize>,
    }

    let config = IntegratorConfig::default();
    assert_eq!(config.policy, Policy::Rms);
    assert_eq!(config.controller.safety, 0.9);
    assert!(config.sequence.is_empty());
}

#[test]
fn test_optional_literals_are_wrapped() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct StepConfig {
        #[default(1e-3)]
        pub initial_step: Option<f64>,

        #[default(-2)]
        pub offset: Option<i64>,

        #[default(Some(0.5))]
        pub drag: Option<f64>,

        #[default(None)]
        pub uniform_field: Option<[f64; 3]>,
    }

    let config = StepConfig::default();
    assert_eq!(config.initial_step, Some(1e-3));
    assert_eq!(config.offset, Some(-2));
    assert_eq!(config.drag, Some(0.5));
    assert_eq!(config.uniform_field, None);
}

#[test]
fn test_name_value_form() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct RunConfig {
        #[default = 100.0]
        pub end_time: f64,

        #[default = "cluster"]
        pub scenario: String,
    }

    let config = RunConfig::default();
    assert_eq!(config.end_time, 100.0);
    assert_eq!(config.scenario, "cluster");
}

#[test]
fn test_generic_struct() {
    #[derive(ConfigDefaults, Clone, Debug, PartialEq)]
    struct GenericConfig<T: Clone + Default> {
        #[default(T::default())]
        pub value: T,

        #[default(42)]
        pub number: i32,
    }

    let config: GenericConfig<String> = GenericConfig::default();
    assert_eq!(config.value, String::default());
    assert_eq!(config.number, 42);
}

#[test]
fn test_with_serde() {
    use serde::{Deserialize, Serialize};

    #[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
    #[serde(default)]
    struct RunConfig {
        #[default(100.0)]
        pub end_time: f64,

        #[default("cluster")]
        pub scenario: String,

        #[default([4, 8])]
        pub sizes: Vec<usize>,
    }

    let config = RunConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let deserialized: RunConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, deserialized);

    // Missing keys fall back to the derived defaults
    let partial: RunConfig = serde_json::from_str(r#"{"end_time": 5.0}"#).unwrap();
    assert_eq!(partial.end_time, 5.0);
    assert_eq!(partial.scenario, "cluster");
    assert_eq!(partial.sizes, vec![4, 8]);
}
