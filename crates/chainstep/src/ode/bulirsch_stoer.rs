//! Bulirsch–Stoer extrapolation over a symplectic sub-stepper

use crate::config::IntegratorConfig;
use crate::error::{ChainstepError, Result};
use crate::ode::Integrable;
use crate::ode::error_estimator::ErrorEstimator;
use crate::ode::step_controller::StepController;
use crate::physics::integrators::{StepperRegistry, SymplecticStepper};
use crate::physics::math::Scalar;
use tracing::{debug, error, trace, warn};

/// Running totals over the lifetime of an integrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Sub-stepper invocations, including those of rejected attempts
    pub substeps: u64,
}

/// Result of one accepted macro step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Step actually taken
    pub step: Scalar,
    /// Proposed size of the next step
    pub next_step: Scalar,
    pub error_ratio: Scalar,
    /// Extrapolation rows used by the accepted attempt
    pub rows: usize,
    /// Rejected attempts before acceptance
    pub rejections: usize,
}

/// Adaptive Bulirsch–Stoer integrator.
///
/// Each attempt integrates the macro step `h` with `n_k` sub-steps of the
/// wrapped symplectic stepper for each entry `n_k` of the sub-step sequence,
/// then extrapolates the sequence of results to zero sub-step size with
/// Neville's scheme in `(h / n_k)²`. The attempt converges at the first row
/// whose two highest-order estimates agree to tolerance. If no row converges
/// the step is retried with a smaller `h`.
///
/// Order and step size are chosen together. After an accepted step each of
/// the last two rows proposes a step from its own error ratio, and the row
/// with the least sub-step work per unit of time becomes the target for the
/// next attempt, which builds at most one row past it. A converged step
/// with no rejections may raise the target by one.
///
/// All buffers are allocated once and reused.
#[derive(Debug)]
pub struct BulirschStoer {
    stepper: Box<dyn SymplecticStepper>,
    estimator: Box<dyn ErrorEstimator>,
    controller: Box<dyn StepController>,
    sequence: Vec<usize>,
    rtol: Scalar,
    atol: Scalar,
    step_floor: Scalar,
    /// `coefficients[k][j] = 1 / ((n_k / n_{k-j})² - 1)`
    coefficients: Vec<Vec<Scalar>>,
    /// `work[k]` is the sub-step count of building rows `0..=k`
    work: Vec<Scalar>,
    /// Error ratio of each row in the latest attempt
    ratios: Vec<Scalar>,
    target: usize,
    stats: IntegratorStats,
    initial: Vec<Scalar>,
    table: Vec<Vec<Scalar>>,
    row: Vec<Scalar>,
    scratch: Vec<Scalar>,
}

impl BulirschStoer {
    pub fn from_config(config: &IntegratorConfig) -> Result<Self> {
        Self::from_config_with_registry(config, &StepperRegistry::new())
    }

    /// Build from configuration, resolving the sub-stepper by order in
    /// `registry`
    pub fn from_config_with_registry(
        config: &IntegratorConfig,
        registry: &StepperRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let stepper = registry.create_by_order(config.order)?;
        let rows = config.max_table_rows.min(config.sequence.len());
        let sequence = config.sequence[..rows].to_vec();

        let coefficients = sequence
            .iter()
            .enumerate()
            .map(|(k, &n_k)| {
                (0..=k)
                    .map(|j| {
                        if j == 0 {
                            return 0.0;
                        }
                        let ratio = n_k as Scalar / sequence[k - j] as Scalar;
                        1.0 / (ratio * ratio - 1.0)
                    })
                    .collect()
            })
            .collect();
        let work = sequence
            .iter()
            .scan(0.0, |total, &n| {
                *total += n as Scalar;
                Some(*total)
            })
            .collect();

        Ok(Self {
            stepper,
            estimator: config.error_policy.estimator(),
            controller: Box::new(config.controller.controller()),
            table: vec![Vec::new(); rows],
            sequence,
            rtol: config.rtol,
            atol: config.atol(),
            step_floor: config.step_floor,
            coefficients,
            work,
            ratios: vec![Scalar::INFINITY; rows],
            target: initial_target(config.rtol, rows),
            stats: IntegratorStats::default(),
            initial: Vec::new(),
            row: Vec::new(),
            scratch: Vec::new(),
        })
    }

    pub fn with_stepper(mut self, stepper: Box<dyn SymplecticStepper>) -> Self {
        self.stepper = stepper;
        self
    }

    pub fn with_estimator(mut self, estimator: Box<dyn ErrorEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_controller(mut self, controller: Box<dyn StepController>) -> Self {
        self.controller = controller;
        self
    }

    pub fn stepper(&self) -> &dyn SymplecticStepper {
        self.stepper.as_ref()
    }

    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }

    pub fn stats(&self) -> IntegratorStats {
        self.stats
    }

    /// Row the next attempt aims to converge at
    pub fn target_row(&self) -> usize {
        self.target
    }

    /// Override the target row, clamped to the rows the table holds
    pub fn set_target_row(&mut self, row: usize) {
        self.target = row.clamp(1, self.max_row());
    }

    /// Clear statistics, the controller history and the order choice
    pub fn reset(&mut self) {
        self.stats = IntegratorStats::default();
        self.controller.reset();
        self.target = initial_target(self.rtol, self.sequence.len());
    }

    fn max_row(&self) -> usize {
        self.sequence.len().saturating_sub(1).max(1)
    }

    /// Advance `state` by one accepted macro step, starting with a trial of
    /// size `step`.
    ///
    /// On success the state sits at `t0 + outcome.step`. On failure the state
    /// is restored to `t0`.
    ///
    /// # Errors
    /// [`ChainstepError::InvalidConfig`] for a zero or non-finite `step`, and
    /// [`ChainstepError::StepSizeUnderflow`] when rejections shrink the step
    /// below the configured floor.
    pub fn advance<S: Integrable>(&mut self, state: &mut S, step: Scalar) -> Result<StepOutcome> {
        if !step.is_finite() || step == 0.0 {
            return Err(ChainstepError::InvalidConfig(format!(
                "macro step must be finite and non-zero, got {step}"
            )));
        }

        state.pre_step();
        state.write_scalars(&mut self.initial);
        let t0 = state.time();
        let mut h = step;
        let mut rejections = 0;

        loop {
            let (converged, ratio, k) = self.attempt(state, h)?;

            if converged {
                state.read_scalars(&self.table[k])?;
                state.set_time(t0 + h);
                state.post_step();

                let next_step = self.choose_next(h, k, rejections);
                self.stats.accepted += 1;
                trace!(
                    t = t0 + h,
                    step = h,
                    ratio,
                    rows = k + 1,
                    target = self.target,
                    "accepted step"
                );

                return Ok(StepOutcome {
                    step: h,
                    next_step,
                    error_ratio: ratio,
                    rows: k + 1,
                    rejections,
                });
            }

            state.read_scalars(&self.initial)?;
            self.stats.rejected += 1;
            rejections += 1;

            let retry = h * self.controller.rejected_scale(ratio, self.error_order(k));
            if ratio.is_finite() {
                debug!(t = t0, step = h, retry, ratio, "rejected step");
            } else {
                warn!(t = t0, step = h, retry, "non-finite error estimate, retrying with a smaller step");
            }

            if retry.abs() < self.step_floor {
                error!(
                    t = t0,
                    step = retry,
                    floor = self.step_floor,
                    ratio,
                    "step size underflow"
                );
                return Err(ChainstepError::StepSizeUnderflow {
                    time: t0,
                    step: retry,
                    floor: self.step_floor,
                    error_ratio: ratio,
                });
            }
            h = retry;
        }
    }

    /// Order of the error estimate of row `k`
    fn error_order(&self, k: usize) -> usize {
        (2 * k).max(self.stepper.order()) + 1
    }

    /// Pick the target row and size of the next step after row `k` converged
    /// on a step of size `h`.
    ///
    /// Rows `k - 1` and `k` are priced at `work / proposed step`. The cheaper
    /// one wins, with a margin favoring the row that just converged.
    fn choose_next(&mut self, h: Scalar, k: usize, rejections: usize) -> Scalar {
        // Priced before `accepted_scale` records row k's ratio
        let lower = (k > 1).then(|| {
            let order = self.error_order(k - 1);
            let scale = self.controller.proposed_scale(self.ratios[k - 1], order);
            (scale, self.work[k - 1] / scale)
        });
        let order = self.error_order(k);
        let scale = self.controller.accepted_scale(self.ratios[k], order);
        let cost = self.work[k] / scale;

        let (mut target, mut next) = (k, h * scale);
        match lower {
            Some((lower_scale, lower_cost)) if lower_cost < 0.8 * cost => {
                target = k - 1;
                next = h * lower_scale;
            }
            _ if rejections == 0
                && k + 1 < self.sequence.len()
                && lower.is_none_or(|(_, lower_cost)| cost < 0.9 * lower_cost) =>
            {
                target = k + 1;
                next = h * scale * self.work[k + 1] / self.work[k];
            }
            _ => {}
        }

        if rejections > 0 {
            next = next.signum() * next.abs().min(h.abs());
            target = target.min(k);
        }
        self.target = target.clamp(1, self.max_row());
        next
    }

    /// Fill the extrapolation table row by row until two successive diagonal
    /// estimates agree, building at most one row past the target. Returns
    /// whether they did, the last error ratio, and the index of the last row
    /// built.
    fn attempt<S: Integrable>(&mut self, state: &mut S, h: Scalar) -> Result<(bool, Scalar, usize)> {
        let mut ratio = Scalar::INFINITY;
        let mut last = 0;
        let rows = (self.target + 2).min(self.sequence.len());
        self.ratios.fill(Scalar::INFINITY);

        for k in 0..rows {
            if k > 0 {
                state.read_scalars(&self.initial)?;
            }
            let substeps = self.sequence[k];
            let sub = h / substeps as Scalar;
            for _ in 0..substeps {
                self.stepper.integrate(state, sub);
            }
            self.stats.substeps += substeps as u64;
            state.write_scalars(&mut self.row);

            for j in 1..=k {
                let c = self.coefficients[k][j];
                let previous = &self.table[j - 1];
                self.scratch.clear();
                self.scratch.extend(
                    self.row
                        .iter()
                        .zip(previous)
                        .map(|(&current, &older)| current + (current - older) * c),
                );
                std::mem::swap(&mut self.table[j - 1], &mut self.row);
                std::mem::swap(&mut self.row, &mut self.scratch);
            }
            std::mem::swap(&mut self.table[k], &mut self.row);
            last = k;

            if k == 0 {
                continue;
            }
            // The time entry is excluded; it extrapolates exactly
            ratio = self.estimator.estimate(
                &self.table[k][1..],
                &self.table[k - 1][1..],
                self.atol,
                self.rtol,
            );
            self.ratios[k] = ratio;
            if ratio <= 1.0 {
                return Ok((true, ratio, k));
            }
            if !ratio.is_finite() {
                break;
            }
        }

        Ok((false, ratio, last))
    }
}

/// Starting target row for a relative tolerance: about one row per decade
/// and a half of accuracy asked for
fn initial_target(rtol: Scalar, rows: usize) -> usize {
    let guess = libm::floor(-0.6 * libm::log10(rtol) + 1.5);
    let max_row = rows.saturating_sub(1).max(1);
    if guess.is_finite() && guess > 1.0 {
        (guess as usize).min(max_row)
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode::error_estimator::ErrorPolicy;
    use crate::ode::step_controller::PidController;
    use crate::physics::integrators::PhaseSpace;
    use crate::physics::integrators::test_support::Oscillator;
    use std::sync::{Arc, Mutex};

    impl Integrable for Oscillator {
        fn time(&self) -> Scalar {
            self.t
        }

        fn set_time(&mut self, time: Scalar) {
            self.t = time;
        }

        fn scalar_len(&self) -> usize {
            3
        }

        fn write_scalars(&self, out: &mut Vec<Scalar>) {
            out.clear();
            out.extend([self.t, self.x, self.v]);
        }

        fn read_scalars(&mut self, scalars: &[Scalar]) -> Result<()> {
            if scalars.len() != 3 {
                return Err(ChainstepError::BufferLength {
                    expected: 3,
                    actual: scalars.len(),
                });
            }
            self.t = scalars[0];
            self.x = scalars[1];
            self.v = scalars[2];
            Ok(())
        }
    }

    /// Blows up to NaN on every kick
    #[derive(Debug, Default)]
    struct Poisoned {
        t: Scalar,
        v: Scalar,
    }

    impl PhaseSpace for Poisoned {
        fn advance_position(&mut self, step: Scalar) {
            self.t += step;
        }

        fn advance_velocity(&mut self, _step: Scalar) {
            self.v = Scalar::NAN;
        }
    }

    impl Integrable for Poisoned {
        fn time(&self) -> Scalar {
            self.t
        }

        fn set_time(&mut self, time: Scalar) {
            self.t = time;
        }

        fn scalar_len(&self) -> usize {
            2
        }

        fn write_scalars(&self, out: &mut Vec<Scalar>) {
            out.clear();
            out.extend([self.t, self.v]);
        }

        fn read_scalars(&mut self, scalars: &[Scalar]) -> Result<()> {
            self.t = scalars[0];
            self.v = scalars[1];
            Ok(())
        }
    }

    /// Wraps the default controller and logs every rejection scale it hands out
    #[derive(Debug, Default)]
    struct RecordingController {
        inner: PidController,
        rejections: Arc<Mutex<Vec<Scalar>>>,
    }

    impl StepController for RecordingController {
        fn accepted_scale(&mut self, ratio: Scalar, order: usize) -> Scalar {
            self.inner.accepted_scale(ratio, order)
        }

        fn proposed_scale(&self, ratio: Scalar, order: usize) -> Scalar {
            self.inner.proposed_scale(ratio, order)
        }

        fn rejected_scale(&self, ratio: Scalar, order: usize) -> Scalar {
            let scale = self.inner.rejected_scale(ratio, order);
            self.rejections.lock().unwrap().push(scale);
            scale
        }

        fn reset(&mut self) {
            self.inner.reset();
        }
    }

    /// Trial sizes of one `advance` call, starting from `step`
    fn trial_steps(step: Scalar, scales: &[Scalar]) -> Vec<Scalar> {
        let mut steps = vec![step];
        for scale in scales {
            let last = steps[steps.len() - 1];
            steps.push(last * scale);
        }
        steps
    }

    fn integrator(rtol: Scalar) -> BulirschStoer {
        BulirschStoer::from_config(&IntegratorConfig {
            rtol,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_coefficients() {
        let bs = integrator(1e-10);
        // n = 4 over n = 2
        assert!((bs.coefficients[1][1] - 1.0 / 3.0).abs() < 1e-15);
        // n = 6 over n = 2
        assert!((bs.coefficients[2][2] - 1.0 / 8.0).abs() < 1e-15);
        assert_eq!(bs.sequence(), &[2, 4, 6, 8, 12, 16, 24, 32]);
    }

    #[test]
    fn test_accepted_step_is_accurate() {
        let mut bs = integrator(1e-12);
        let mut state = Oscillator::new(1.0);
        let outcome = bs.advance(&mut state, 0.5).unwrap();

        assert_eq!(outcome.step, 0.5);
        assert_eq!(outcome.rejections, 0);
        assert!(outcome.error_ratio <= 1.0);
        assert_eq!(state.t, 0.5);
        let (x, v) = state.exact(0.5);
        assert!((state.x - x).abs() < 1e-10, "x error {}", state.x - x);
        assert!((state.v - v).abs() < 1e-10, "v error {}", state.v - v);
        assert_eq!(bs.stats().accepted, 1);
    }

    #[test]
    fn test_oversized_step_is_rejected_and_shrunk() {
        let mut bs = integrator(1e-12);
        let mut state = Oscillator::new(1.0);
        let outcome = bs.advance(&mut state, 20.0).unwrap();

        assert!(outcome.rejections > 0);
        assert!(outcome.step < 20.0);
        assert!(outcome.next_step <= outcome.step);
        assert_eq!(state.t, outcome.step);
        assert_eq!(bs.stats().rejected, outcome.rejections as u64);
    }

    #[test]
    fn test_retried_steps_shrink_until_accepted() {
        let rejections = Arc::new(Mutex::new(Vec::new()));
        let controller = RecordingController {
            rejections: Arc::clone(&rejections),
            ..Default::default()
        };
        let mut bs = integrator(1e-12).with_controller(Box::new(controller));
        let mut state = Oscillator::new(1.0);
        let outcome = bs.advance(&mut state, 20.0).unwrap();

        let steps = trial_steps(20.0, &rejections.lock().unwrap());
        assert_eq!(steps.len(), outcome.rejections + 1);
        assert!(steps.windows(2).all(|w| w[1] < w[0]), "{steps:?}");
        assert_eq!(outcome.step, steps[steps.len() - 1]);
    }

    #[test]
    fn test_retried_steps_shrink_until_underflow() {
        let rejections = Arc::new(Mutex::new(Vec::new()));
        let controller = RecordingController {
            rejections: Arc::clone(&rejections),
            ..Default::default()
        };
        let mut bs = BulirschStoer::from_config(&IntegratorConfig {
            step_floor: 1e-3,
            ..Default::default()
        })
        .unwrap()
        .with_controller(Box::new(controller));
        let mut state = Poisoned { t: 0.0, v: 1.0 };

        let err = bs.advance(&mut state, 1.0).unwrap_err();
        let ChainstepError::StepSizeUnderflow { step, floor, .. } = err else {
            panic!("unexpected error {err}");
        };

        let steps = trial_steps(1.0, &rejections.lock().unwrap());
        assert!(steps.windows(2).all(|w| w[1] < w[0]), "{steps:?}");
        let (last, tried) = steps.split_last().unwrap();
        assert_eq!(*last, step);
        assert!(*last < floor);
        assert!(tried.iter().all(|&h| h >= floor));
    }

    #[test]
    fn test_work_per_period_does_not_depend_on_first_step() {
        let period = 2.0 * std::f64::consts::PI;
        let mut substeps = Vec::new();
        for first in [1e-4, 1e-2, 1.0] {
            let mut bs = integrator(1e-10);
            let mut state = Oscillator::new(1.0);
            let mut step = first;
            let mut deepest = 0;
            while state.t < period {
                let outcome = bs.advance(&mut state, step).unwrap();
                deepest = deepest.max(outcome.rows);
                step = outcome.next_step;
            }

            assert!(deepest >= 5, "first step {first}: never went past {deepest} rows");
            assert!(step > 0.5, "first step {first}: settled at {step}");
            let (x, _) = state.exact(state.t);
            assert!((state.x - x).abs() < 1e-8);
            substeps.push(bs.stats().substeps);
        }

        assert!(substeps.iter().all(|&n| n < 1000), "{substeps:?}");
    }

    #[test]
    fn test_target_row_follows_tolerance() {
        assert_eq!(integrator(1e-4).target_row(), 3);
        assert_eq!(integrator(1e-10).target_row(), 7);
        assert_eq!(integrator(1e-2).target_row(), 2);
        assert_eq!(integrator(0.5).target_row(), 1);

        let mut bs = integrator(1e-10);
        bs.set_target_row(0);
        assert_eq!(bs.target_row(), 1);
        bs.set_target_row(100);
        assert_eq!(bs.target_row(), 7);
        bs.reset();
        assert_eq!(bs.target_row(), 7);
    }

    #[test]
    fn test_long_run_conserves_energy() {
        let mut bs = integrator(1e-12);
        let mut state = Oscillator::new(2.0);
        let initial_energy = state.energy();
        let mut step = 0.1;
        while state.t < 20.0 {
            step = bs.advance(&mut state, step).unwrap().next_step;
        }
        let (x, _) = state.exact(state.t);
        assert!((state.energy() - initial_energy).abs() / initial_energy < 1e-10);
        assert!((state.x - x).abs() < 1e-8);
    }

    #[test]
    fn test_underflow_restores_state() {
        let mut bs = BulirschStoer::from_config(&IntegratorConfig {
            step_floor: 1e-3,
            ..Default::default()
        })
        .unwrap();
        let mut state = Poisoned {
            t: 2.0,
            v: 1.0,
        };

        let err = bs.advance(&mut state, 1.0).unwrap_err();
        match err {
            ChainstepError::StepSizeUnderflow {
                time, step, floor, ..
            } => {
                assert_eq!(time, 2.0);
                assert!(step.abs() < floor);
                assert_eq!(floor, 1e-3);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(state.t, 2.0);
        assert_eq!(state.v, 1.0);
        assert_eq!(bs.stats().accepted, 0);
        assert!(bs.stats().rejected >= 4);
    }

    #[test]
    fn test_rejects_degenerate_steps() {
        let mut bs = integrator(1e-10);
        let mut state = Oscillator::new(1.0);
        for step in [0.0, Scalar::NAN, Scalar::INFINITY] {
            assert!(matches!(
                bs.advance(&mut state, step),
                Err(ChainstepError::InvalidConfig(_))
            ));
        }
        assert_eq!(state.t, 0.0);
    }

    #[test]
    fn test_backward_step() {
        let mut bs = integrator(1e-12);
        let mut state = Oscillator::new(1.0);
        bs.advance(&mut state, 0.4).unwrap();
        bs.advance(&mut state, -0.4).unwrap();
        assert!(state.t.abs() < 1e-15);
        assert!((state.x - 1.0).abs() < 1e-11);
        assert!(state.v.abs() < 1e-11);
    }

    #[test]
    fn test_every_policy_and_order_converges() {
        for policy in [ErrorPolicy::Rms, ErrorPolicy::WorstOffender] {
            for order in [2, 4, 6, 8] {
                let mut bs = BulirschStoer::from_config(&IntegratorConfig {
                    order,
                    error_policy: policy,
                    rtol: 1e-11,
                    ..Default::default()
                })
                .unwrap();
                assert_eq!(bs.stepper().order(), order);

                let mut state = Oscillator::new(1.0);
                let outcome = bs.advance(&mut state, 0.3).unwrap();
                let (x, _) = state.exact(outcome.step);
                assert!((state.x - x).abs() < 1e-9, "{policy:?} order {order}");
            }
        }
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = || {
            let mut bs = integrator(1e-11);
            let mut state = Oscillator::new(3.0);
            let mut step = 0.7;
            for _ in 0..50 {
                step = bs.advance(&mut state, step).unwrap().next_step;
            }
            (state.t.to_bits(), state.x.to_bits(), state.v.to_bits(), bs.stats())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset_clears_stats() {
        let mut bs = integrator(1e-10);
        let mut state = Oscillator::new(1.0);
        bs.advance(&mut state, 0.1).unwrap();
        bs.reset();
        assert_eq!(bs.stats(), IntegratorStats::default());
    }
}
