//! Photo camera control.
//!
//! The trap loop only sees `CaptureController`: a busy flag and two
//! fire-and-forget triggers. `SequenceController` runs each sequence on its own
//! worker thread against a `CameraBackend` (gphoto2, or a dry-run logger) and
//! owns every failure that happens there.

mod camera;
mod controller;

use std::time::Duration;

pub use camera::{CameraBackend, CameraKind, Gphoto2Camera, LogOnlyCamera};
pub use controller::{bracket_offsets, SequenceController};

/// Photo camera controller as seen by the detection loop.
pub trait CaptureController {
    /// True while a capture sequence is running.
    fn is_capturing(&self) -> bool;

    /// Start `count` shots spaced `interval` apart. Returns immediately.
    fn trigger_time_lapse(&self, interval: Duration, count: u32);

    /// Start a `count` shot exposure bracket with `ev_step` EV between shots.
    /// Returns immediately.
    fn trigger_exposure_bracket(&self, ev_step: f64, count: u32);
}

/// Which sequence a motion event starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureMode {
    TimeLapse { interval: Duration },
    ExposureBracket { ev_step: f64 },
}

impl CaptureMode {
    /// An exposure step, when given, wins over the photo interval.
    pub fn select(photo_interval: Duration, photo_ev_step: Option<f64>) -> Self {
        match photo_ev_step {
            Some(ev_step) => Self::ExposureBracket { ev_step },
            None => Self::TimeLapse {
                interval: photo_interval,
            },
        }
    }

    /// Dispatch this mode's trigger on `controller`.
    pub fn trigger<C: CaptureController + ?Sized>(&self, controller: &C, count: u32) {
        match *self {
            Self::TimeLapse { interval } => controller.trigger_time_lapse(interval, count),
            Self::ExposureBracket { ev_step } => {
                controller.trigger_exposure_bracket(ev_step, count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposure_step_takes_precedence() {
        let interval = Duration::from_secs(3);
        assert_eq!(
            CaptureMode::select(interval, Some(0.7)),
            CaptureMode::ExposureBracket { ev_step: 0.7 }
        );
        assert_eq!(
            CaptureMode::select(interval, None),
            CaptureMode::TimeLapse { interval }
        );
    }
}
