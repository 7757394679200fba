//! Hooks called by [`Simulation`](crate::simulation::Simulation) after every
//! accepted step

use crate::error::Result;
use crate::physics::diagnostics::{self, Conserved};
use crate::physics::math::Scalar;
use crate::physics::system::ParticleSystem;
use crate::simulation::StepInfo;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

pub trait Observer {
    /// Called once, before the first step of the first run
    fn start(&mut self, _system: &ParticleSystem) -> Result<()> {
        Ok(())
    }

    fn observe(&mut self, system: &ParticleSystem, step: &StepInfo) -> Result<Control>;

    /// Called at the end of every run
    fn finish(&mut self, _system: &ParticleSystem) -> Result<()> {
        Ok(())
    }
}

impl<T: Observer + ?Sized> Observer for &mut T {
    fn start(&mut self, system: &ParticleSystem) -> Result<()> {
        (**self).start(system)
    }

    fn observe(&mut self, system: &ParticleSystem, step: &StepInfo) -> Result<Control> {
        (**self).observe(system, step)
    }

    fn finish(&mut self, system: &ParticleSystem) -> Result<()> {
        (**self).finish(system)
    }
}

/// Observer backed by a closure
pub struct FromFn<F>(F);

/// Wrap a closure as an [`Observer`]
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&ParticleSystem, &StepInfo) -> Result<Control>,
{
    FromFn(f)
}

impl<F> Observer for FromFn<F>
where
    F: FnMut(&ParticleSystem, &StepInfo) -> Result<Control>,
{
    fn observe(&mut self, system: &ParticleSystem, step: &StepInfo) -> Result<Control> {
        (self.0)(system, step)
    }
}

/// Stops the run after a fixed number of accepted steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimit {
    max_steps: u64,
    taken: u64,
}

impl StepLimit {
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            taken: 0,
        }
    }
}

impl Observer for StepLimit {
    fn observe(&mut self, _system: &ParticleSystem, _step: &StepInfo) -> Result<Control> {
        self.taken += 1;
        if self.taken >= self.max_steps {
            Ok(Control::Stop)
        } else {
            Ok(Control::Continue)
        }
    }
}

/// Tracks the relative energy error against the energy at the start of the
/// run
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyMonitor {
    gravitational_constant: Scalar,
    limit: Option<Scalar>,
    reference: Option<Conserved>,
    samples: u64,
    sum_squares: Scalar,
    max_error: Scalar,
}

impl EnergyMonitor {
    pub fn new(gravitational_constant: Scalar) -> Self {
        Self {
            gravitational_constant,
            limit: None,
            reference: None,
            samples: 0,
            sum_squares: 0.0,
            max_error: 0.0,
        }
    }

    /// Stop the run once the relative energy error exceeds `limit`
    pub fn with_limit(mut self, limit: Scalar) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reference(&self) -> Option<&Conserved> {
        self.reference.as_ref()
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn max_error(&self) -> Scalar {
        self.max_error
    }

    pub fn rms_error(&self) -> Scalar {
        if self.samples == 0 {
            0.0
        } else {
            libm::sqrt(self.sum_squares / self.samples as Scalar)
        }
    }
}

impl Observer for EnergyMonitor {
    fn start(&mut self, system: &ParticleSystem) -> Result<()> {
        self.reference = Some(Conserved::measure(system.particles(), self.gravitational_constant));
        Ok(())
    }

    fn observe(&mut self, system: &ParticleSystem, step: &StepInfo) -> Result<Control> {
        let reference = match self.reference {
            Some(reference) => reference,
            None => {
                let reference = Conserved::measure(system.particles(), self.gravitational_constant);
                self.reference = Some(reference);
                reference
            }
        };

        let energy = diagnostics::total_energy(system.particles(), self.gravitational_constant);
        let error = diagnostics::relative_error(energy, reference.energy());
        self.samples += 1;
        self.sum_squares += error * error;
        self.max_error = self.max_error.max(error);

        match self.limit {
            Some(limit) if !(error <= limit) => {
                warn!(t = step.time, error, limit, "energy error above limit");
                Ok(Control::Stop)
            }
            _ => Ok(Control::Continue),
        }
    }

    fn finish(&mut self, system: &ParticleSystem) -> Result<()> {
        info!(
            t = system.time(),
            rms = self.rms_error(),
            max = self.max_error,
            "relative energy error"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SnapshotRow {
    time: Scalar,
    id: usize,
    mass: Scalar,
    x: Scalar,
    y: Scalar,
    z: Scalar,
    vx: Scalar,
    vy: Scalar,
    vz: Scalar,
}

/// Writes the particle state as CSV at (roughly) evenly spaced times.
///
/// A snapshot is written at the start and at the first accepted step at or
/// past each of `count` evenly spaced times between `start` and `end`. States
/// are not interpolated, so the `time` column holds the step time.
pub struct SnapshotWriter<W: io::Write> {
    writer: csv::Writer<W>,
    start: Scalar,
    end: Scalar,
    interval: Scalar,
    count: usize,
    next: usize,
    written: usize,
}

impl SnapshotWriter<File> {
    pub fn to_path(path: impl AsRef<Path>, start: Scalar, end: Scalar, count: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Writing snapshots to {}", path.display());
        Ok(Self::new(csv::Writer::from_path(path)?, start, end, count))
    }
}

impl<W: io::Write> SnapshotWriter<W> {
    pub fn new(writer: csv::Writer<W>, start: Scalar, end: Scalar, count: usize) -> Self {
        let count = count.max(1);
        Self {
            writer,
            start,
            end,
            interval: (end - start) / count as Scalar,
            count,
            next: 0,
            written: 0,
        }
    }

    /// Snapshots written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::ChainstepError::Io(e.into_error()))
    }

    fn target(&self, index: usize) -> Scalar {
        if index == self.count {
            self.end
        } else {
            self.start + self.interval * index as Scalar
        }
    }

    fn is_due(&self, time: Scalar) -> bool {
        if self.next > self.count {
            return false;
        }
        let target = self.target(self.next);
        if self.interval >= 0.0 {
            time >= target
        } else {
            time <= target
        }
    }

    fn write(&mut self, system: &ParticleSystem) -> Result<()> {
        let particles = system.particles();
        for p in particles.particles() {
            self.writer.serialize(SnapshotRow {
                time: particles.time(),
                id: p.id,
                mass: p.mass,
                x: p.position.x,
                y: p.position.y,
                z: p.position.z,
                vx: p.velocity.x,
                vy: p.velocity.y,
                vz: p.velocity.z,
            })?;
        }
        self.written += 1;
        Ok(())
    }
}

impl<W: io::Write> Observer for SnapshotWriter<W> {
    fn start(&mut self, system: &ParticleSystem) -> Result<()> {
        if self.is_due(system.time()) {
            self.write(system)?;
            self.next = 1;
        }
        Ok(())
    }

    fn observe(&mut self, system: &ParticleSystem, _step: &StepInfo) -> Result<Control> {
        let time = system.time();
        if self.is_due(time) {
            self.write(system)?;
            while self.is_due(time) {
                self.next += 1;
            }
        }
        Ok(Control::Continue)
    }

    fn finish(&mut self, _system: &ParticleSystem) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::interaction::ForceModel;
    use crate::physics::scenarios::two_body;
    use crate::physics::system::RepresentationKind;

    fn system() -> ParticleSystem {
        ParticleSystem::new(
            two_body(1.0, 1.0, 1.0, 0.0, 1.0).unwrap(),
            ForceModel::default(),
            RepresentationKind::ChainAware,
        )
    }

    fn info(time: Scalar) -> StepInfo {
        StepInfo {
            index: 1,
            time,
            step: 0.1,
            next_step: 0.1,
            error_ratio: 0.5,
            rows: 3,
            rejections: 0,
            relinked: false,
        }
    }

    #[test]
    fn test_step_limit() {
        let system = system();
        let mut limit = StepLimit::new(2);
        assert_eq!(limit.observe(&system, &info(0.1)).unwrap(), Control::Continue);
        assert_eq!(limit.observe(&system, &info(0.2)).unwrap(), Control::Stop);
    }

    #[test]
    fn test_energy_monitor_without_drift() {
        let system = system();
        let mut monitor = EnergyMonitor::new(1.0).with_limit(1e-12);
        monitor.start(&system).unwrap();
        assert_eq!(monitor.observe(&system, &info(0.0)).unwrap(), Control::Continue);
        assert_eq!(monitor.max_error(), 0.0);
        assert_eq!(monitor.rms_error(), 0.0);
        assert_eq!(monitor.samples(), 1);
    }

    #[test]
    fn test_energy_monitor_stops_on_limit() {
        let system = system();
        // A reference taken with a different G makes the error large
        let mut monitor = EnergyMonitor::new(2.0).with_limit(1e-3);
        monitor.start(&system).unwrap();
        monitor.gravitational_constant = 1.0;
        assert_eq!(monitor.observe(&system, &info(0.1)).unwrap(), Control::Stop);
        assert!(monitor.max_error() > 1e-3);
    }

    #[test]
    fn test_snapshots_are_evenly_spaced() {
        let system = system();
        let mut writer = SnapshotWriter::new(csv::Writer::from_writer(Vec::new()), 0.0, 1.0, 4);
        writer.start(&system).unwrap();
        // A step past two targets writes once and skips both
        let mut late = system.clone();
        crate::ode::Integrable::set_time(&mut late, 0.6);
        writer.observe(&late, &info(0.6)).unwrap();
        assert_eq!(writer.written(), 2);

        crate::ode::Integrable::set_time(&mut late, 0.65);
        writer.observe(&late, &info(0.65)).unwrap();
        assert_eq!(writer.written(), 2);

        crate::ode::Integrable::set_time(&mut late, 1.0);
        writer.observe(&late, &info(1.0)).unwrap();
        assert_eq!(writer.written(), 3);

        crate::ode::Integrable::set_time(&mut late, 1.1);
        writer.observe(&late, &info(1.1)).unwrap();
        assert_eq!(writer.written(), 3);

        let csv = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,id,mass,x,y,z,vx,vy,vz");
        // Header plus two particles for each of three snapshots
        assert_eq!(lines.len(), 7);
        assert!(lines[3].starts_with("0.6,0,"));
    }

    #[test]
    fn test_mutable_reference_is_an_observer() {
        let system = system();
        let mut limit = StepLimit::new(1);
        {
            let mut borrowed: Box<dyn Observer + '_> = Box::new(&mut limit);
            assert_eq!(borrowed.observe(&system, &info(0.1)).unwrap(), Control::Stop);
        }
        assert_eq!(limit.taken, 1);
    }
}
