//! The integration loop tying a particle system to the extrapolation
//! integrator and its observers

use crate::config::SimulationConfig;
use crate::error::{ChainstepError, Result};
use crate::observers::{Control, Observer};
use crate::ode::{BulirschStoer, Integrable};
use crate::physics::diagnostics;
use crate::physics::math::Scalar;
use crate::physics::system::ParticleSystem;
use tracing::{debug, info};

/// Starting macro step when neither the configuration nor the initial
/// conditions suggest one
const FALLBACK_STEP: Scalar = 1e-3;

/// What happened during one accepted macro step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    /// Number of accepted steps so far, this one included
    pub index: u64,
    /// Time after the step
    pub time: Scalar,
    pub step: Scalar,
    pub next_step: Scalar,
    pub error_ratio: Scalar,
    pub rows: usize,
    pub rejections: usize,
    /// Whether the chain ordering changed after the step
    pub relinked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub accepted: u64,
    pub rejected: u64,
    /// Step size the next call would start with
    pub final_step: Scalar,
    pub final_time: Scalar,
    pub relinks: usize,
    pub stopped_by_observer: bool,
}

pub struct Simulation<'a> {
    system: ParticleSystem,
    integrator: BulirschStoer,
    observers: Vec<Box<dyn Observer + 'a>>,
    step: Scalar,
    steps: u64,
    started: bool,
}

impl std::fmt::Debug for Simulation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("system", &self.system)
            .field("integrator", &self.integrator)
            .field("observers", &self.observers.len())
            .field("step", &self.step)
            .field("steps", &self.steps)
            .finish()
    }
}

impl<'a> Simulation<'a> {
    pub fn new(system: ParticleSystem, integrator: BulirschStoer, initial_step: Scalar) -> Result<Self> {
        if !(initial_step.is_finite() && initial_step > 0.0) {
            return Err(ChainstepError::InvalidConfig(format!(
                "initial step must be positive and finite, got {initial_step}"
            )));
        }
        Ok(Self {
            system,
            integrator,
            observers: Vec::new(),
            step: initial_step,
            steps: 0,
            started: false,
        })
    }

    /// Build the configured scenario, force model and integrator
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let g = config.system.gravitational_constant;
        let particles = config.run.scenario.build(&config.run, g)?;
        let step = config
            .integrator
            .initial_step
            .or_else(|| diagnostics::suggested_step(&particles, g))
            .unwrap_or(FALLBACK_STEP);

        let system = ParticleSystem::new(
            particles,
            config.system.force_model(),
            config.system.representation,
        );
        let integrator = BulirschStoer::from_config(&config.integrator)?;
        info!(
            scenario = ?config.run.scenario,
            bodies = system.len(),
            representation = ?system.kind(),
            stepper = integrator.stepper().name(),
            initial_step = step,
            "simulation ready"
        );
        Self::new(system, integrator, step)
    }

    pub fn with_observer(mut self, observer: impl Observer + 'a) -> Self {
        self.add_observer(observer);
        self
    }

    pub fn add_observer(&mut self, observer: impl Observer + 'a) {
        self.observers.push(Box::new(observer));
    }

    pub fn system(&self) -> &ParticleSystem {
        &self.system
    }

    pub fn into_system(self) -> ParticleSystem {
        self.system
    }

    pub fn integrator(&self) -> &BulirschStoer {
        &self.integrator
    }

    pub fn time(&self) -> Scalar {
        self.system.time()
    }

    /// Step size the next macro step starts from
    pub fn step(&self) -> Scalar {
        self.step
    }

    /// Integrate until `end`, which may lie before the current time.
    ///
    /// The final step is clipped to land on `end`; clipping does not shrink
    /// the step carried into later calls. Stops early, after notifying every
    /// observer, when any observer returns [`Control::Stop`].
    pub fn run_until(&mut self, end: Scalar) -> Result<RunSummary> {
        if !end.is_finite() {
            return Err(ChainstepError::InvalidConfig(format!(
                "end time must be finite, got {end}"
            )));
        }
        if !self.started {
            for observer in &mut self.observers {
                observer.start(&self.system)?;
            }
            self.started = true;
        }

        let start_stats = self.integrator.stats();
        let start_relinks = self.system.relink_count();
        let mut stopped = false;

        while self.system.time() != end {
            let remaining = end - self.system.time();
            let natural = self.step.abs().copysign(remaining);
            let clipped = natural.abs() >= remaining.abs();
            let trial = if clipped { remaining } else { natural };

            let relinks = self.system.relink_count();
            let target = self.integrator.target_row();
            let outcome = self.integrator.advance(&mut self.system, trial)?;

            let landed = clipped && outcome.step == trial;
            if landed {
                self.system.set_time(end);
            }
            if !landed || outcome.rejections > 0 {
                self.step = outcome.next_step.abs();
            } else {
                // A short final step says nothing about the natural order
                self.integrator.set_target_row(target);
            }
            self.steps += 1;

            let info = StepInfo {
                index: self.steps,
                time: self.system.time(),
                step: outcome.step,
                next_step: outcome.next_step,
                error_ratio: outcome.error_ratio,
                rows: outcome.rows,
                rejections: outcome.rejections,
                relinked: self.system.relink_count() != relinks,
            };
            if info.relinked {
                debug!(t = info.time, order = ?self.system.chain_order(), "chain relinked");
            }

            for observer in &mut self.observers {
                if observer.observe(&self.system, &info)? == Control::Stop {
                    stopped = true;
                }
            }
            if stopped {
                info!(t = info.time, "stopped by observer");
                break;
            }
        }

        for observer in &mut self.observers {
            observer.finish(&self.system)?;
        }

        let stats = self.integrator.stats();
        Ok(RunSummary {
            accepted: stats.accepted - start_stats.accepted,
            rejected: stats.rejected - start_stats.rejected,
            final_step: self.step,
            final_time: self.system.time(),
            relinks: self.system.relink_count() - start_relinks,
            stopped_by_observer: stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegratorConfig;
    use crate::observers::{StepLimit, from_fn};
    use crate::physics::interaction::ForceModel;
    use crate::physics::scenarios::{kepler_period, two_body};
    use crate::physics::system::RepresentationKind;

    fn binary_simulation<'a>(initial_step: Scalar) -> Simulation<'a> {
        let system = ParticleSystem::new(
            two_body(1.0, 1.0, 1.0, 0.0, 1.0).unwrap(),
            ForceModel::default(),
            RepresentationKind::ChainAware,
        );
        let integrator = BulirschStoer::from_config(&IntegratorConfig {
            rtol: 1e-10,
            ..Default::default()
        })
        .unwrap();
        Simulation::new(system, integrator, initial_step).unwrap()
    }

    #[test]
    fn test_lands_exactly_on_end_time() {
        let mut simulation = binary_simulation(0.3);
        let summary = simulation.run_until(1.0).unwrap();
        assert_eq!(summary.final_time, 1.0);
        assert_eq!(simulation.time(), 1.0);
        assert!(!summary.stopped_by_observer);
        assert!(summary.accepted >= 1);
    }

    #[test]
    fn test_clipping_keeps_natural_step() {
        let mut simulation = binary_simulation(0.05);
        simulation.run_until(0.5).unwrap();
        let natural = simulation.step();

        // A tiny remaining interval must not shrink the carried step
        simulation.run_until(0.5 + 1e-6).unwrap();
        assert_eq!(simulation.time(), 0.5 + 1e-6);
        assert_eq!(simulation.step(), natural);
    }

    #[test]
    fn test_full_period_returns_to_start() {
        let mut simulation = binary_simulation(0.01);
        let initial = simulation.system().particles().clone();
        let period = kepler_period(2.0, 1.0, 1.0);
        simulation.run_until(period).unwrap();

        let positions = simulation.system().particles().positions();
        for i in 0..2 {
            let error = (positions.get(i) - initial.positions().get(i)).length();
            assert!(error < 1e-8, "particle {i} off by {error}");
        }
    }

    #[test]
    fn test_runs_backwards() {
        let mut simulation = binary_simulation(0.1);
        let initial = simulation.system().particles().clone();
        simulation.run_until(2.0).unwrap();
        simulation.run_until(0.0).unwrap();

        assert_eq!(simulation.time(), 0.0);
        let error = (simulation.system().particles().positions().get(0) - initial.positions().get(0)).length();
        assert!(error < 1e-8);
    }

    #[test]
    fn test_observer_stop_ends_run_after_all_observers() {
        let mut seen = Vec::new();
        let summary = {
            let mut simulation = binary_simulation(0.01)
                .with_observer(StepLimit::new(3))
                .with_observer(from_fn(|_system: &ParticleSystem, info: &StepInfo| {
                    seen.push(info.index);
                    Ok(Control::Continue)
                }));
            simulation.run_until(100.0).unwrap()
        };
        assert!(summary.stopped_by_observer);
        assert_eq!(summary.accepted, 3);
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(summary.final_time < 100.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let system = ParticleSystem::new(
            two_body(1.0, 1.0, 1.0, 0.0, 1.0).unwrap(),
            ForceModel::default(),
            RepresentationKind::PlainCartesian,
        );
        let integrator = BulirschStoer::from_config(&IntegratorConfig::default()).unwrap();
        assert!(Simulation::new(system, integrator, 0.0).is_err());

        let mut simulation = binary_simulation(0.1);
        assert!(simulation.run_until(Scalar::NAN).is_err());
    }

    #[test]
    fn test_from_config() {
        let mut config = SimulationConfig::default();
        config.run.end_time = 0.5;
        let mut simulation = Simulation::from_config(&config).unwrap();
        assert_eq!(simulation.system().len(), 2);
        let summary = simulation.run_until(config.run.end_time).unwrap();
        assert_eq!(summary.final_time, 0.5);
    }
}
