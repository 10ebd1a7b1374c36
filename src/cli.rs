//! Command-line surface for the `motion_trap` binary.
//!
//! Every option can also come from a `MOTION_TRAP_*` environment variable or
//! from the config file; the command line wins, then the environment, then the
//! file, then the built-in defaults.

use clap::Parser;
use std::path::PathBuf;

use crate::config::ConfigLayer;

#[derive(Parser, Debug, Default)]
#[command(
    name = "motion_trap",
    version,
    about = "Detects motion with a webcam and, when it does, captures photos on a \
             gphoto2-compatible camera."
)]
pub struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "MOTION_TRAP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the motion ratio of every sampled frame.
    #[arg(long, env = "MOTION_TRAP_DEBUG")]
    pub debug: bool,

    /// Device index of the detection camera (default -1 = system default).
    #[arg(long, env = "MOTION_TRAP_CAM_INDEX", allow_negative_numbers = true)]
    pub cam_index: Option<i32>,

    /// Detection camera device path or stub:// scene; overrides --cam-index.
    #[arg(long, env = "MOTION_TRAP_DEVICE")]
    pub device: Option<String>,

    /// Capture width for the detection camera (default 320).
    #[arg(long, env = "MOTION_TRAP_WIDTH")]
    pub width: Option<u32>,

    /// Capture height for the detection camera (default 240).
    #[arg(long, env = "MOTION_TRAP_HEIGHT")]
    pub height: Option<u32>,

    /// Interval between detection frames, in seconds (default 0.25).
    #[arg(long, env = "MOTION_TRAP_DETECTION_INTERVAL", value_name = "SECS")]
    pub detection_interval: Option<f64>,

    /// Learning rate for the background model (default 0.008; negative = automatic).
    #[arg(long, env = "MOTION_TRAP_LEARNING_RATE", allow_negative_numbers = true)]
    pub learning_rate: Option<f64>,

    /// Proportion of the frame that must be foreground to trigger a motion event
    /// (default 0.15, valid range [0.0, 1.0]).
    #[arg(long, env = "MOTION_TRAP_MIN_MOTION", allow_negative_numbers = true)]
    pub min_motion: Option<f64>,

    /// Number of photo frames per motion event (default 1).
    #[arg(long, env = "MOTION_TRAP_PHOTO_COUNT")]
    pub photo_count: Option<u32>,

    /// Interval between photo frames, in seconds (default 3.0).
    #[arg(long, env = "MOTION_TRAP_PHOTO_INTERVAL", value_name = "SECS")]
    pub photo_interval: Option<f64>,

    /// Exposure step between photo frames, in EV. When set, --photo-interval is
    /// ignored and --photo-count is the length of an exposure bracket.
    #[arg(
        long,
        env = "MOTION_TRAP_PHOTO_EV_STEP",
        value_name = "EV",
        allow_negative_numbers = true
    )]
    pub photo_ev_step: Option<f64>,

    /// Background model: mog2 or running-average (default mog2).
    #[arg(long, env = "MOTION_TRAP_ESTIMATOR")]
    pub estimator: Option<String>,

    /// Photo camera backend: gphoto2 or log (dry run) (default gphoto2).
    #[arg(long, env = "MOTION_TRAP_PHOTO_BACKEND")]
    pub photo_backend: Option<String>,

    /// Path to the gphoto2 executable (default gphoto2).
    #[arg(long, env = "MOTION_TRAP_GPHOTO2", value_name = "PATH")]
    pub gphoto2: Option<PathBuf>,

    /// Download filename pattern handed to gphoto2 --filename.
    #[arg(long, env = "MOTION_TRAP_PHOTO_FILENAME", value_name = "PATTERN")]
    pub photo_filename: Option<String>,

    /// Seconds between stats log lines; 0 disables (default 60).
    #[arg(long, env = "MOTION_TRAP_STATS_INTERVAL", value_name = "SECS")]
    pub stats_interval: Option<f64>,
}

impl Args {
    /// Settings given on the command line or through the environment.
    pub fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            debug: self.debug.then_some(true),
            cam_index: self.cam_index,
            device: self.device.clone(),
            width: self.width,
            height: self.height,
            detection_interval: self.detection_interval,
            learning_rate: self.learning_rate,
            min_motion: self.min_motion,
            photo_count: self.photo_count,
            photo_interval: self.photo_interval,
            photo_ev_step: self.photo_ev_step,
            estimator: self.estimator.clone(),
            photo_backend: self.photo_backend.clone(),
            gphoto2: self.gphoto2.clone(),
            photo_filename: self.photo_filename.clone(),
            stats_interval: self.stats_interval,
        }
    }
}
