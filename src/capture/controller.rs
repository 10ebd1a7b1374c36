use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::camera::CameraBackend;
use super::CaptureController;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Sequence {
    TimeLapse { interval: Duration, count: u32 },
    ExposureBracket { ev_step: f64, count: u32 },
}

impl Sequence {
    fn describe(&self) -> String {
        match self {
            Self::TimeLapse { interval, count } => format!(
                "time-lapse ({} shots, {:.2}s apart)",
                count,
                interval.as_secs_f64()
            ),
            Self::ExposureBracket { ev_step, count } => {
                format!("exposure bracket ({} shots, {} EV step)", count, ev_step)
            }
        }
    }
}

/// Clears the capturing flag when a sequence ends, including by panic.
struct CapturingGuard(Arc<AtomicBool>);

impl Drop for CapturingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs capture sequences on a worker thread, one at a time.
///
/// The capturing flag is raised synchronously by a trigger and lowered by the
/// worker when the sequence completes or fails. A trigger that arrives while a
/// sequence is running is dropped.
pub struct SequenceController<B: CameraBackend> {
    camera: Arc<Mutex<B>>,
    capturing: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<B: CameraBackend> SequenceController<B> {
    pub fn new(camera: B) -> Self {
        Self {
            camera: Arc::new(Mutex::new(camera)),
            capturing: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Block until no sequence is running or `timeout` passes.
    ///
    /// Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.capturing.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
        true
    }

    fn start(&self, sequence: Sequence) {
        if self
            .capturing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!(
                "capture already in progress, ignoring {}",
                sequence.describe()
            );
            return;
        }

        let camera = Arc::clone(&self.camera);
        let guard = CapturingGuard(Arc::clone(&self.capturing));
        let spawned = std::thread::Builder::new()
            .name("capture-sequence".to_string())
            .spawn(move || {
                let _guard = guard;
                let started = Instant::now();
                log::info!("capture: starting {}", sequence.describe());
                match run_sequence(&camera, sequence) {
                    Ok(()) => log::info!(
                        "capture: finished {} in {:.1}s",
                        sequence.describe(),
                        started.elapsed().as_secs_f64()
                    ),
                    Err(err) => log::error!("capture: {} failed: {:#}", sequence.describe(), err),
                }
            });

        match spawned {
            Ok(handle) => {
                if let Ok(mut worker) = self.worker.lock() {
                    // The previous worker has already lowered the flag.
                    if let Some(previous) = worker.replace(handle) {
                        let _ = previous.join();
                    }
                }
            }
            Err(err) => {
                // The closure, and with it the guard, is dropped on spawn failure.
                log::error!("capture: failed to spawn sequence worker: {}", err);
            }
        }
    }
}

impl<B: CameraBackend> CaptureController for SequenceController<B> {
    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn trigger_time_lapse(&self, interval: Duration, count: u32) {
        self.start(Sequence::TimeLapse { interval, count });
    }

    fn trigger_exposure_bracket(&self, ev_step: f64, count: u32) {
        self.start(Sequence::ExposureBracket { ev_step, count });
    }
}

/// Exposure offsets for a `count` shot bracket, centred on 0 EV, ascending.
pub fn bracket_offsets(ev_step: f64, count: u32) -> Vec<f64> {
    let centre = count.saturating_sub(1) as f64 / 2.0;
    (0..count)
        .map(|i| (i as f64 - centre) * ev_step)
        .collect()
}

fn run_sequence<B: CameraBackend>(camera: &Mutex<B>, sequence: Sequence) -> Result<()> {
    let mut camera = camera
        .lock()
        .map_err(|_| anyhow!("camera lock poisoned"))?;

    match sequence {
        Sequence::TimeLapse { interval, count } => {
            for shot in 0..count {
                if shot > 0 {
                    std::thread::sleep(interval);
                }
                camera
                    .capture()
                    .with_context(|| format!("shot {}/{}", shot + 1, count))?;
            }
            Ok(())
        }
        Sequence::ExposureBracket { ev_step, count } => {
            let shots = shoot_bracket(&mut *camera, &bracket_offsets(ev_step, count));
            let restore = camera
                .set_exposure_compensation(0.0)
                .context("restore exposure compensation");
            shots.and(restore)
        }
    }
}

fn shoot_bracket<B: CameraBackend>(camera: &mut B, offsets: &[f64]) -> Result<()> {
    for (shot, &ev) in offsets.iter().enumerate() {
        camera
            .set_exposure_compensation(ev)
            .with_context(|| format!("set exposure {:+.2} EV", ev))?;
        camera
            .capture()
            .with_context(|| format!("shot {}/{} at {:+.2} EV", shot + 1, offsets.len(), ev))?;
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Shot,
        Exposure(f64),
    }

    #[derive(Clone, Default)]
    struct RecordingCamera {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_on_shot: Option<usize>,
        shots: usize,
    }

    impl CameraBackend for RecordingCamera {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn capture(&mut self) -> Result<()> {
            self.shots += 1;
            if self.fail_on_shot == Some(self.shots) {
                bail!("camera busy");
            }
            self.calls.lock().unwrap().push(Call::Shot);
            Ok(())
        }

        fn set_exposure_compensation(&mut self, ev: f64) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Exposure(ev));
            Ok(())
        }
    }

    fn calls(camera: &RecordingCamera) -> Vec<Call> {
        camera.calls.lock().unwrap().clone()
    }

    #[test]
    fn bracket_offsets_are_centred() {
        assert_eq!(bracket_offsets(1.0, 1), vec![0.0]);
        assert_eq!(bracket_offsets(1.0, 3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(bracket_offsets(2.0, 2), vec![-1.0, 1.0]);
        assert!(bracket_offsets(1.0, 0).is_empty());
    }

    #[test]
    fn time_lapse_takes_count_shots_then_goes_idle() {
        let camera = RecordingCamera::default();
        let controller = SequenceController::new(camera.clone());
        assert!(!controller.is_capturing());

        controller.trigger_time_lapse(Duration::from_millis(10), 3);
        assert!(controller.is_capturing());
        assert!(controller.wait_idle(Duration::from_secs(5)));

        assert!(!controller.is_capturing());
        assert_eq!(calls(&camera), vec![Call::Shot, Call::Shot, Call::Shot]);
    }

    #[test]
    fn exposure_bracket_steps_and_restores() {
        let camera = RecordingCamera::default();
        let controller = SequenceController::new(camera.clone());

        controller.trigger_exposure_bracket(1.0, 3);
        assert!(controller.wait_idle(Duration::from_secs(5)));

        assert_eq!(
            calls(&camera),
            vec![
                Call::Exposure(-1.0),
                Call::Shot,
                Call::Exposure(0.0),
                Call::Shot,
                Call::Exposure(1.0),
                Call::Shot,
                Call::Exposure(0.0),
            ]
        );
    }

    #[test]
    fn failed_shot_aborts_sequence_and_clears_flag() {
        let camera = RecordingCamera {
            fail_on_shot: Some(2),
            ..RecordingCamera::default()
        };
        let controller = SequenceController::new(camera.clone());

        controller.trigger_time_lapse(Duration::from_millis(1), 4);
        assert!(controller.wait_idle(Duration::from_secs(5)));
        assert!(!controller.is_capturing());
        assert_eq!(calls(&camera), vec![Call::Shot]);

        // The controller accepts new work after a failure.
        controller.trigger_time_lapse(Duration::from_millis(1), 1);
        assert!(controller.wait_idle(Duration::from_secs(5)));
        assert_eq!(calls(&camera), vec![Call::Shot, Call::Shot]);
    }

    #[test]
    fn trigger_while_busy_is_ignored() {
        let camera = RecordingCamera::default();
        let controller = SequenceController::new(camera.clone());

        controller.trigger_time_lapse(Duration::from_millis(100), 2);
        controller.trigger_exposure_bracket(1.0, 3);
        assert!(controller.wait_idle(Duration::from_secs(5)));

        assert_eq!(calls(&camera), vec![Call::Shot, Call::Shot]);
    }

    #[test]
    fn wait_idle_times_out_while_capturing() {
        let controller = SequenceController::new(RecordingCamera::default());
        controller.trigger_time_lapse(Duration::from_millis(300), 2);
        assert!(!controller.wait_idle(Duration::from_millis(20)));
        assert!(controller.wait_idle(Duration::from_secs(5)));
    }
}
