//! Command line interface for Chainstep

use clap::Parser;
use tracing::info;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::observers::{EnergyMonitor, SnapshotWriter};
use crate::ode::ErrorPolicy;
use crate::physics::integrators::StepperRegistry;
use crate::physics::scenarios::Scenario;
use crate::physics::system::RepresentationKind;
use crate::simulation::{RunSummary, Simulation};

fn long_version() -> &'static str {
    concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")")
}

/// Chainstep - chain-regularized Bulirsch–Stoer N-body integrator
#[derive(Parser, Debug)]
#[command(version, long_version = long_version(), about, long_about = None)]
pub struct Args {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Initial conditions to integrate
    #[arg(long, value_enum, value_name = "SCENARIO")]
    pub scenario: Option<Scenario>,

    /// Number of bodies in the random cluster (overrides config file)
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub bodies: Option<usize>,

    /// Random seed for the random cluster
    #[arg(short = 's', long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Time to integrate to
    #[arg(short = 't', long, value_name = "TIME")]
    pub end_time: Option<f64>,

    /// Relative error tolerance
    #[arg(long, value_name = "TOL")]
    pub rtol: Option<f64>,

    /// Order of the symplectic sub-stepper (2, 4, 6 or 8)
    #[arg(long, value_name = "ORDER")]
    pub order: Option<usize>,

    /// Sub-stepper by name or alias (e.g. leapfrog, yoshida4)
    #[arg(long, value_name = "NAME", conflicts_with = "order")]
    pub stepper: Option<String>,

    #[arg(long, value_enum, value_name = "POLICY")]
    pub error_policy: Option<ErrorPolicy>,

    /// Integrate plain Cartesian coordinates instead of the chain
    #[arg(long)]
    pub plain: bool,

    /// CSV file receiving snapshots
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Number of evenly spaced snapshots
    #[arg(long, value_name = "COUNT")]
    pub snapshots: Option<usize>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List available steppers and exit
    #[arg(long)]
    pub list_steppers: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Handles the --list-steppers flag by printing available steppers
pub fn handle_list_steppers() {
    let registry = StepperRegistry::new();
    println!("Available steppers:");
    for stepper in registry.all() {
        println!("  - {} (order {})", stepper.name(), stepper.order());
    }

    let aliases = registry.list_aliases();
    if !aliases.is_empty() {
        println!("\nAliases:");
        for (alias, target) in aliases {
            println!("  - {alias} -> {target}");
        }
    }
}

/// Loads configuration from file or the user's configuration, then applies
/// command-line overrides
pub fn load_and_apply_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load_with_env(path)?,
        None => SimulationConfig::load_from_user_config()?,
    };
    apply_overrides(args, &mut config)?;
    config.validate()?;
    Ok(config)
}

fn apply_overrides(args: &Args, config: &mut SimulationConfig) -> Result<()> {
    if let Some(scenario) = args.scenario {
        info!("Using scenario: {scenario:?}");
        config.run.scenario = scenario;
    }

    if let Some(body_count) = args.bodies {
        info!("Overriding body count to: {body_count}");
        config.run.body_count = body_count;
    }

    if let Some(seed) = args.seed {
        info!("Using random seed: {seed}");
        config.run.seed = seed;
    }

    if let Some(end_time) = args.end_time {
        config.run.end_time = end_time;
    }

    if let Some(rtol) = args.rtol {
        info!("Overriding relative tolerance to: {rtol}");
        config.integrator.rtol = rtol;
    }

    if let Some(order) = args.order {
        config.integrator.order = order;
    }

    if let Some(name) = &args.stepper {
        // Validate stepper name against registry
        let stepper = StepperRegistry::new().create(name)?;
        info!("Using stepper: {}", stepper.name());
        config.integrator.order = stepper.order();
    }

    if let Some(policy) = args.error_policy {
        config.integrator.error_policy = policy;
    }

    if args.plain {
        config.system.representation = RepresentationKind::PlainCartesian;
    }

    if let Some(path) = &args.output {
        config.output.snapshot_path = Some(path.clone());
    }

    if let Some(count) = args.snapshots {
        config.output.snapshot_count = count;
    }

    Ok(())
}

/// Run the configured simulation to its end time with an energy monitor and,
/// when configured, a snapshot writer attached
pub fn run(config: &SimulationConfig) -> Result<(RunSummary, EnergyMonitor)> {
    let mut monitor = EnergyMonitor::new(config.system.gravitational_constant);
    let mut simulation = Simulation::from_config(config)?;
    let start = simulation.time();

    if let Some(path) = &config.output.snapshot_path {
        let writer = SnapshotWriter::to_path(
            path,
            start,
            config.run.end_time,
            config.output.snapshot_count,
        )?;
        simulation.add_observer(writer);
    }
    simulation.add_observer(&mut monitor);

    let summary = simulation.run_until(config.run.end_time)?;
    drop(simulation);
    Ok((summary, monitor))
}

/// Human-readable run report
pub fn report(summary: &RunSummary, monitor: &EnergyMonitor) -> String {
    format!(
        "t = {}\naccepted steps: {}\nrejected steps: {}\nchain relinks: {}\nlast step: {:e}\n\
         energy error (rms): {:e}\nenergy error (max): {:e}",
        summary.final_time,
        summary.accepted,
        summary.rejected,
        summary.relinks,
        summary.final_step,
        monitor.rms_error(),
        monitor.max_error(),
    )
}
