use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CameraKind, CaptureMode};
use crate::detect::EstimatorKind;
use crate::ingest::device_for_index;

pub const DEFAULT_CAM_INDEX: i32 = -1;
pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;
pub const DEFAULT_DETECTION_INTERVAL_SECS: f64 = 0.25;
pub const DEFAULT_LEARNING_RATE: f64 = 0.008;
pub const DEFAULT_MIN_MOTION: f64 = 0.15;
pub const DEFAULT_PHOTO_COUNT: u32 = 1;
pub const DEFAULT_PHOTO_INTERVAL_SECS: f64 = 3.0;
pub const DEFAULT_GPHOTO2: &str = "gphoto2";
pub const DEFAULT_STATS_INTERVAL_SECS: f64 = 60.0;

/// One layer of optional settings: a config file, or command-line/environment
/// values. Later layers override earlier ones field by field.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub debug: Option<bool>,
    pub cam_index: Option<i32>,
    pub device: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub detection_interval: Option<f64>,
    pub learning_rate: Option<f64>,
    pub min_motion: Option<f64>,
    pub photo_count: Option<u32>,
    pub photo_interval: Option<f64>,
    pub photo_ev_step: Option<f64>,
    pub estimator: Option<String>,
    pub photo_backend: Option<String>,
    pub gphoto2: Option<PathBuf>,
    pub photo_filename: Option<String>,
    pub stats_interval: Option<f64>,
}

impl ConfigLayer {
    /// Overlay `over` on top of `self`.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            debug: over.debug.or(self.debug),
            cam_index: over.cam_index.or(self.cam_index),
            device: over.device.or(self.device),
            width: over.width.or(self.width),
            height: over.height.or(self.height),
            detection_interval: over.detection_interval.or(self.detection_interval),
            learning_rate: over.learning_rate.or(self.learning_rate),
            min_motion: over.min_motion.or(self.min_motion),
            photo_count: over.photo_count.or(self.photo_count),
            photo_interval: over.photo_interval.or(self.photo_interval),
            photo_ev_step: over.photo_ev_step.or(self.photo_ev_step),
            estimator: over.estimator.or(self.estimator),
            photo_backend: over.photo_backend.or(self.photo_backend),
            gphoto2: over.gphoto2.or(self.gphoto2),
            photo_filename: over.photo_filename.or(self.photo_filename),
            stats_interval: over.stats_interval.or(self.stats_interval),
        }
    }
}

/// Resolved, validated trap configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapConfig {
    pub debug: bool,
    pub cam_index: i32,
    /// Device actually opened: `device` when given, else derived from `cam_index`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub detection_interval: Duration,
    pub learning_rate: f64,
    pub min_motion: f64,
    pub photo_count: u32,
    pub photo_interval: Duration,
    pub photo_ev_step: Option<f64>,
    pub estimator: EstimatorKind,
    pub photo_backend: CameraKind,
    pub gphoto2: PathBuf,
    pub photo_filename: Option<String>,
    /// Period of the stats log line; zero disables it.
    pub stats_interval: Duration,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            debug: false,
            cam_index: DEFAULT_CAM_INDEX,
            device: device_for_index(DEFAULT_CAM_INDEX),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            detection_interval: Duration::from_secs_f64(DEFAULT_DETECTION_INTERVAL_SECS),
            learning_rate: DEFAULT_LEARNING_RATE,
            min_motion: DEFAULT_MIN_MOTION,
            photo_count: DEFAULT_PHOTO_COUNT,
            photo_interval: Duration::from_secs_f64(DEFAULT_PHOTO_INTERVAL_SECS),
            photo_ev_step: None,
            estimator: EstimatorKind::default(),
            photo_backend: CameraKind::default(),
            gphoto2: PathBuf::from(DEFAULT_GPHOTO2),
            photo_filename: None,
            stats_interval: Duration::from_secs_f64(DEFAULT_STATS_INTERVAL_SECS),
        }
    }
}

impl TrapConfig {
    /// Load defaults, then the config file at `path` (if any), then `overrides`.
    pub fn load(path: Option<&Path>, overrides: ConfigLayer) -> Result<Self> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigLayer::default(),
        };
        Self::from_layer(file.merge(overrides))
    }

    pub fn from_layer(layer: ConfigLayer) -> Result<Self> {
        let cam_index = layer.cam_index.unwrap_or(DEFAULT_CAM_INDEX);
        let device = match layer.device {
            Some(device) if !device.trim().is_empty() => device,
            _ => device_for_index(cam_index),
        };

        let width = layer.width.unwrap_or(DEFAULT_WIDTH);
        let height = layer.height.unwrap_or(DEFAULT_HEIGHT);
        if width == 0 || height == 0 {
            bail!("width and height must be positive (got {}x{})", width, height);
        }

        let detection_interval = positive_secs(
            "detection-interval",
            layer
                .detection_interval
                .unwrap_or(DEFAULT_DETECTION_INTERVAL_SECS),
        )?;

        let learning_rate = layer.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE);
        if !learning_rate.is_finite() {
            log::warn!(
                "learning-rate {} is not finite; the estimator will pick its own rate",
                learning_rate
            );
        }

        let min_motion = layer.min_motion.unwrap_or(DEFAULT_MIN_MOTION);
        if !(0.0..=1.0).contains(&min_motion) {
            log::warn!(
                "min-motion {} is outside [0.0, 1.0]; the trap will {}",
                min_motion,
                if min_motion > 1.0 {
                    "never trigger"
                } else {
                    "trigger on every frame"
                }
            );
        }

        let photo_count = layer.photo_count.unwrap_or(DEFAULT_PHOTO_COUNT);
        if photo_count == 0 {
            bail!("photo-count must be at least 1");
        }

        let photo_ev_step = layer.photo_ev_step;
        if let Some(ev) = photo_ev_step {
            if !ev.is_finite() {
                bail!("photo-ev-step must be a finite number of EV (got {})", ev);
            }
        }

        let interval_secs = layer.photo_interval.unwrap_or(DEFAULT_PHOTO_INTERVAL_SECS);
        let photo_interval = if photo_ev_step.is_some() {
            // Unused in bracket mode.
            Duration::try_from_secs_f64(interval_secs).unwrap_or_default()
        } else {
            positive_secs("photo-interval", interval_secs)?
        };

        let estimator = match layer.estimator.as_deref() {
            Some(name) => EstimatorKind::parse(name)?,
            None => EstimatorKind::default(),
        };
        let photo_backend = match layer.photo_backend.as_deref() {
            Some(name) => CameraKind::parse(name)?,
            None => CameraKind::default(),
        };

        let stats_secs = layer.stats_interval.unwrap_or(DEFAULT_STATS_INTERVAL_SECS);
        let stats_interval = Duration::try_from_secs_f64(stats_secs)
            .map_err(|_| anyhow!("stats-interval must be zero or a positive number of seconds"))?;

        Ok(Self {
            debug: layer.debug.unwrap_or(false),
            cam_index,
            device,
            width,
            height,
            detection_interval,
            learning_rate,
            min_motion,
            photo_count,
            photo_interval,
            photo_ev_step,
            estimator,
            photo_backend,
            gphoto2: layer
                .gphoto2
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GPHOTO2)),
            photo_filename: layer.photo_filename.filter(|p| !p.trim().is_empty()),
            stats_interval,
        })
    }

    /// Sequence started by a motion event.
    pub fn capture_mode(&self) -> CaptureMode {
        CaptureMode::select(self.photo_interval, self.photo_ev_step)
    }
}

fn positive_secs(name: &str, secs: f64) -> Result<Duration> {
    if secs.is_nan() || secs <= 0.0 {
        bail!("{} must be greater than zero (got {})", name, secs);
    }
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("invalid {} {}: {}", name, secs, e))
}

/// Read a config file: JSON when the extension is `.json`, TOML otherwise.
fn read_config_file(path: &Path) -> Result<ConfigLayer> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() -> Result<()> {
        let cfg = TrapConfig::from_layer(ConfigLayer::default())?;
        assert_eq!(cfg, TrapConfig::default());
        assert_eq!(cfg.device, "/dev/video0");
        assert_eq!((cfg.width, cfg.height), (320, 240));
        assert_eq!(cfg.detection_interval, Duration::from_millis(250));
        assert_eq!(cfg.learning_rate, 0.008);
        assert_eq!(cfg.min_motion, 0.15);
        assert_eq!(cfg.photo_count, 1);
        assert_eq!(cfg.photo_interval, Duration::from_secs(3));
        assert_eq!(cfg.photo_ev_step, None);
        assert!(!cfg.debug);
        Ok(())
    }

    #[test]
    fn later_layer_wins() {
        let base = ConfigLayer {
            width: Some(640),
            height: Some(480),
            min_motion: Some(0.3),
            ..ConfigLayer::default()
        };
        let over = ConfigLayer {
            width: Some(160),
            ..ConfigLayer::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.width, Some(160));
        assert_eq!(merged.height, Some(480));
        assert_eq!(merged.min_motion, Some(0.3));
    }

    #[test]
    fn explicit_device_overrides_cam_index() -> Result<()> {
        let cfg = TrapConfig::from_layer(ConfigLayer {
            cam_index: Some(3),
            ..ConfigLayer::default()
        })?;
        assert_eq!(cfg.device, "/dev/video3");

        let cfg = TrapConfig::from_layer(ConfigLayer {
            cam_index: Some(3),
            device: Some("stub://yard".to_string()),
            ..ConfigLayer::default()
        })?;
        assert_eq!(cfg.device, "stub://yard");
        assert_eq!(cfg.cam_index, 3);
        Ok(())
    }

    #[test]
    fn ev_step_selects_bracket_and_skips_interval_check() -> Result<()> {
        let cfg = TrapConfig::from_layer(ConfigLayer {
            photo_interval: Some(0.0),
            photo_ev_step: Some(1.5),
            photo_count: Some(3),
            ..ConfigLayer::default()
        })?;
        assert_eq!(cfg.capture_mode(), CaptureMode::ExposureBracket { ev_step: 1.5 });

        let cfg = TrapConfig::from_layer(ConfigLayer {
            photo_interval: Some(5.0),
            ..ConfigLayer::default()
        })?;
        assert_eq!(
            cfg.capture_mode(),
            CaptureMode::TimeLapse {
                interval: Duration::from_secs(5)
            }
        );
        Ok(())
    }

    #[test]
    fn rejects_unusable_values() {
        let bad = [
            ConfigLayer {
                width: Some(0),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                detection_interval: Some(0.0),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                detection_interval: Some(f64::NAN),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                photo_count: Some(0),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                photo_interval: Some(-1.0),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                photo_ev_step: Some(f64::INFINITY),
                ..ConfigLayer::default()
            },
            ConfigLayer {
                estimator: Some("knn".to_string()),
                ..ConfigLayer::default()
            },
        ];
        for layer in bad {
            assert!(TrapConfig::from_layer(layer.clone()).is_err(), "{:?}", layer);
        }
    }

    #[test]
    fn out_of_range_min_motion_is_accepted() -> Result<()> {
        let cfg = TrapConfig::from_layer(ConfigLayer {
            min_motion: Some(1.5),
            ..ConfigLayer::default()
        })?;
        assert_eq!(cfg.min_motion, 1.5);
        Ok(())
    }
}
