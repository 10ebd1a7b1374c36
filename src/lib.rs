//! Motion-triggered camera trap.
//!
//! A cheap detection camera is sampled at a fixed cadence. Each frame is
//! converted to an equalized intensity image and classified against a learned
//! background model; when the foreground fraction reaches the configured
//! threshold and the photo camera is idle, a time-lapse or exposure-bracket
//! capture sequence is started on the photo camera.
//!
//! - `ingest`: detection camera sources (V4L2, synthetic).
//! - `detect`: foreground estimators (Gaussian mixture, running average).
//! - `capture`: photo camera control (gphoto2, dry run).
//! - `trap`: the sampling and decision loop.

pub mod capture;
pub mod cli;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod trap;

pub use capture::{
    CameraBackend, CameraKind, CaptureController, CaptureMode, Gphoto2Camera, LogOnlyCamera,
    SequenceController,
};
pub use config::{ConfigLayer, TrapConfig};
pub use detect::{EstimatorKind, ForegroundEstimator, Mog2Estimator, RunningAverageEstimator};
pub use frame::{ColorFrame, ForegroundMask, GrayFrame};
pub use ingest::{open_source, FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use trap::{MotionTrap, TickOutcome, TrapStats};

/// Build the photo camera backend selected by `config`.
pub fn build_camera(config: &TrapConfig) -> Box<dyn CameraBackend> {
    match config.photo_backend {
        CameraKind::Gphoto2 => Box::new(
            Gphoto2Camera::new(config.gphoto2.clone()).with_filename(config.photo_filename.clone()),
        ),
        CameraKind::LogOnly => Box::new(LogOnlyCamera::new()),
    }
}
