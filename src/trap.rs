//! Motion decision loop.
//!
//! Each tick pulls one frame from the detection camera, converts it to an
//! equalized intensity image, runs it through the foreground estimator and
//! compares the foreground ratio with the trigger threshold. When the threshold
//! is met and the photo camera is idle, one capture sequence is dispatched.
//!
//! Ticks are separated by a fixed sleep. Processing time is not subtracted, so
//! the effective period is the sampling interval plus the tick's own cost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::capture::{CaptureController, CaptureMode};
use crate::config::TrapConfig;
use crate::detect::ForegroundEstimator;
use crate::ingest::FrameSource;

/// What happened during one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    /// The frame source produced nothing; the estimator was not consulted.
    FrameUnavailable,
    /// Motion stayed below the threshold.
    Quiet { ratio: f64 },
    /// Motion met the threshold but a capture sequence is already running.
    Busy { ratio: f64 },
    /// A capture sequence was dispatched.
    Triggered { ratio: f64, mode: CaptureMode },
}

/// Running counters for the loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrapStats {
    pub frames_sampled: u64,
    pub frames_unavailable: u64,
    pub triggers: u64,
    pub busy_skips: u64,
}

pub struct MotionTrap<S, E, C> {
    source: S,
    estimator: E,
    controller: C,
    sampling_interval: Duration,
    learning_rate: f64,
    min_motion: f64,
    photo_count: u32,
    capture_mode: CaptureMode,
    debug: bool,
    stats_interval: Duration,
    stats: TrapStats,
    last_stats: Instant,
}

impl<S, E, C> MotionTrap<S, E, C>
where
    S: FrameSource,
    E: ForegroundEstimator,
    C: CaptureController,
{
    /// Build a trap around an already configured frame source.
    pub fn new(config: &TrapConfig, source: S, estimator: E, controller: C) -> Self {
        Self {
            source,
            estimator,
            controller,
            sampling_interval: config.detection_interval,
            learning_rate: config.learning_rate,
            min_motion: config.min_motion,
            photo_count: config.photo_count,
            capture_mode: config.capture_mode(),
            debug: config.debug,
            stats_interval: config.stats_interval,
            stats: TrapStats::default(),
            last_stats: Instant::now(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn stats(&self) -> &TrapStats {
        &self.stats
    }

    /// Sample and evaluate one frame, without the sampling delay.
    pub fn tick(&mut self) -> TickOutcome {
        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frames_unavailable += 1;
                log::debug!("frame unavailable, skipping tick: {:#}", err);
                return TickOutcome::FrameUnavailable;
            }
        };
        self.stats.frames_sampled += 1;

        let gray = frame.to_gray().equalize_histogram();
        let mask = self.estimator.estimate(&gray, self.learning_rate);
        let ratio = mask.motion_ratio();

        if self.debug {
            log::info!("motion={:.6}", ratio);
        }

        let over_threshold = ratio >= self.min_motion;
        if !over_threshold {
            return TickOutcome::Quiet { ratio };
        }
        if self.controller.is_capturing() {
            self.stats.busy_skips += 1;
            return TickOutcome::Busy { ratio };
        }

        log::info!(
            "motion {:.3} >= {:.3}: triggering {:?} x{}",
            ratio,
            self.min_motion,
            self.capture_mode,
            self.photo_count
        );
        self.capture_mode
            .trigger(&self.controller, self.photo_count);
        self.stats.triggers += 1;

        TickOutcome::Triggered {
            ratio,
            mode: self.capture_mode,
        }
    }

    /// Sleep for the sampling interval, then tick.
    pub fn step(&mut self) -> TickOutcome {
        std::thread::sleep(self.sampling_interval);
        let outcome = self.tick();
        self.maybe_log_stats();
        outcome
    }

    /// Sample until `stop` is raised. The flag is checked between ticks.
    ///
    /// This is the trap's only loop: with a flag nobody raises it samples
    /// indefinitely.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        log::info!(
            "motion trap running: every {:.3}s, threshold {:.3}, learning rate {}, estimator {}",
            self.sampling_interval.as_secs_f64(),
            self.min_motion,
            self.learning_rate,
            self.estimator.name()
        );
        while !stop.load(Ordering::SeqCst) {
            self.step();
        }
        log::info!(
            "motion trap stopped: {} frames sampled, {} unavailable, {} triggers",
            self.stats.frames_sampled,
            self.stats.frames_unavailable,
            self.stats.triggers
        );
    }

    fn maybe_log_stats(&mut self) {
        if self.stats_interval.is_zero() || self.last_stats.elapsed() < self.stats_interval {
            return;
        }
        let source = self.source.stats();
        log::info!(
            "trap health: sampled={} unavailable={} triggers={} busy_skips={} capturing={} device={} captured={} failed={}",
            self.stats.frames_sampled,
            self.stats.frames_unavailable,
            self.stats.triggers,
            self.stats.busy_skips,
            self.controller.is_capturing(),
            source.device,
            source.frames_captured,
            source.frames_failed
        );
        self.last_stats = Instant::now();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ColorFrame, ForegroundMask, GrayFrame};
    use crate::ingest::SourceStats;
    use anyhow::{anyhow, Result};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Yields a frame per `true`, a failure per `false`, then frames forever.
    struct ScriptedSource {
        script: VecDeque<bool>,
    }

    impl ScriptedSource {
        fn always() -> Self {
            Self {
                script: VecDeque::new(),
            }
        }

        fn with(script: &[bool]) -> Self {
            Self {
                script: script.iter().copied().collect(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn configure(&mut self, _width: u32, _height: u32) -> Result<()> {
            Ok(())
        }

        fn capture(&mut self) -> Result<ColorFrame> {
            if self.script.pop_front().unwrap_or(true) {
                Ok(ColorFrame::filled(100, 100, [90, 90, 90]))
            } else {
                Err(anyhow!("device hiccup"))
            }
        }

        fn stats(&self) -> SourceStats {
            SourceStats::default()
        }
    }

    /// Returns a 100x100 mask with a fixed number of foreground cells.
    struct FixedEstimator {
        foreground: usize,
        rates: Vec<f64>,
    }

    impl FixedEstimator {
        fn with_foreground(foreground: usize) -> Self {
            Self {
                foreground,
                rates: Vec::new(),
            }
        }
    }

    impl ForegroundEstimator for FixedEstimator {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn estimate(&mut self, frame: &GrayFrame, learning_rate: f64) -> ForegroundMask {
            self.rates.push(learning_rate);
            let flags: Vec<bool> = (0..frame.len()).map(|i| i < self.foreground).collect();
            ForegroundMask::from_flags(&flags, frame.width, frame.height).unwrap()
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Trigger {
        TimeLapse(Duration, u32),
        Bracket(f64, u32),
    }

    #[derive(Default)]
    struct RecordingController {
        capturing: Cell<bool>,
        triggers: RefCell<Vec<Trigger>>,
    }

    impl CaptureController for RecordingController {
        fn is_capturing(&self) -> bool {
            self.capturing.get()
        }

        fn trigger_time_lapse(&self, interval: Duration, count: u32) {
            self.triggers
                .borrow_mut()
                .push(Trigger::TimeLapse(interval, count));
        }

        fn trigger_exposure_bracket(&self, ev_step: f64, count: u32) {
            self.triggers
                .borrow_mut()
                .push(Trigger::Bracket(ev_step, count));
        }
    }

    fn build_trap(
        config: &TrapConfig,
        source: ScriptedSource,
        foreground: usize,
    ) -> MotionTrap<ScriptedSource, FixedEstimator, RecordingController> {
        MotionTrap::new(
            config,
            source,
            FixedEstimator::with_foreground(foreground),
            RecordingController::default(),
        )
    }

    fn triggers(
        trap: &MotionTrap<ScriptedSource, FixedEstimator, RecordingController>,
    ) -> Vec<Trigger> {
        trap.controller().triggers.borrow().clone()
    }

    #[test]
    fn motion_above_threshold_starts_time_lapse() {
        let mut trap = build_trap(&TrapConfig::default(), ScriptedSource::always(), 2_000);

        let outcome = trap.tick();
        assert!(matches!(outcome, TickOutcome::Triggered { ratio, .. } if (ratio - 0.20).abs() < 1e-12));
        assert_eq!(
            triggers(&trap),
            vec![Trigger::TimeLapse(Duration::from_secs(3), 1)]
        );
    }

    #[test]
    fn motion_below_threshold_is_quiet() {
        let mut trap = build_trap(&TrapConfig::default(), ScriptedSource::always(), 1_000);

        assert_eq!(trap.tick(), TickOutcome::Quiet { ratio: 0.10 });
        assert!(triggers(&trap).is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut trap = build_trap(&TrapConfig::default(), ScriptedSource::always(), 1_500);

        assert!(matches!(trap.tick(), TickOutcome::Triggered { .. }));
        assert_eq!(triggers(&trap).len(), 1);
    }

    #[test]
    fn never_triggers_while_capturing() {
        let mut trap = build_trap(&TrapConfig::default(), ScriptedSource::always(), 5_000);
        trap.controller().capturing.set(true);

        assert_eq!(trap.tick(), TickOutcome::Busy { ratio: 0.5 });
        assert!(triggers(&trap).is_empty());
        assert_eq!(trap.stats().busy_skips, 1);
    }

    #[test]
    fn exposure_step_uses_bracket_only() {
        let config = TrapConfig {
            photo_ev_step: Some(0.5),
            photo_count: 5,
            photo_interval: Duration::from_secs(9),
            ..TrapConfig::default()
        };
        let mut trap = build_trap(&config, ScriptedSource::always(), 10_000);

        trap.tick();
        assert_eq!(triggers(&trap), vec![Trigger::Bracket(0.5, 5)]);
    }

    #[test]
    fn time_lapse_uses_configured_interval_and_count() {
        let config = TrapConfig {
            photo_count: 4,
            photo_interval: Duration::from_millis(1_500),
            ..TrapConfig::default()
        };
        let mut trap = build_trap(&config, ScriptedSource::always(), 10_000);

        trap.tick();
        assert_eq!(
            triggers(&trap),
            vec![Trigger::TimeLapse(Duration::from_millis(1_500), 4)]
        );
    }

    #[test]
    fn failed_read_skips_estimator_and_dispatch() {
        let mut trap = build_trap(
            &TrapConfig::default(),
            ScriptedSource::with(&[false, true]),
            10_000,
        );

        assert_eq!(trap.tick(), TickOutcome::FrameUnavailable);
        assert!(trap.estimator().rates.is_empty());
        assert!(triggers(&trap).is_empty());
        assert_eq!(trap.stats().frames_unavailable, 1);

        assert!(matches!(trap.tick(), TickOutcome::Triggered { .. }));
        assert_eq!(trap.estimator().rates.len(), 1);
    }

    #[test]
    fn one_trigger_per_tick_and_retrigger_when_idle() {
        let mut trap = build_trap(&TrapConfig::default(), ScriptedSource::always(), 10_000);

        trap.tick();
        assert_eq!(triggers(&trap).len(), 1);
        trap.tick();
        assert_eq!(triggers(&trap).len(), 2);
        assert_eq!(trap.stats().triggers, 2);
    }

    #[test]
    fn learning_rate_is_passed_through() {
        let config = TrapConfig {
            learning_rate: 0.02,
            ..TrapConfig::default()
        };
        let mut trap = build_trap(&config, ScriptedSource::always(), 0);

        for _ in 0..3 {
            trap.tick();
        }
        assert_eq!(trap.estimator().rates, vec![0.02, 0.02, 0.02]);
    }

    #[test]
    fn run_until_returns_when_stopped() {
        let config = TrapConfig {
            detection_interval: Duration::from_millis(1),
            ..TrapConfig::default()
        };
        let mut trap = build_trap(&config, ScriptedSource::always(), 0);
        let stop = AtomicBool::new(true);

        trap.run_until(&stop);
        assert_eq!(trap.stats().frames_sampled, 0);

        trap.step();
        assert_eq!(trap.stats().frames_sampled, 1);
    }
}
