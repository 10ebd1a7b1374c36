//! Detection camera frame sources.
//!
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - Synthetic `stub://` scenes (testing, demos)
//!
//! A source is configured once at startup and then polled once per sampling
//! tick. A failed `capture` is an expected, recoverable outcome: the caller skips
//! that tick. A failed `configure` is fatal.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::ColorFrame;

pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Device path used when no camera index is given.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// A detection camera.
pub trait FrameSource {
    /// Open the device and request a capture geometry.
    ///
    /// Devices may substitute the closest geometry they support; frames report
    /// their actual size.
    fn configure(&mut self, width: u32, height: u32) -> Result<()>;

    /// Grab the next frame.
    fn capture(&mut self) -> Result<ColorFrame>;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn configure(&mut self, width: u32, height: u32) -> Result<()> {
        (**self).configure(width, height)
    }

    fn capture(&mut self) -> Result<ColorFrame> {
        (**self).capture()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Counters for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub device: String,
    pub frames_captured: u64,
    pub frames_failed: u64,
}

/// Map a camera index to a device path. Negative indices select the default.
pub fn device_for_index(cam_index: i32) -> String {
    if cam_index < 0 {
        DEFAULT_DEVICE.to_string()
    } else {
        format!("/dev/video{}", cam_index)
    }
}

/// Open a frame source for `device`. `stub://` devices are synthetic.
///
/// The returned source is not yet configured.
pub fn open_source(device: &str) -> Result<Box<dyn FrameSource>> {
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig::from_device(
            device,
        )?)));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(device)))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "camera device {} requires the ingest-v4l2 feature (or use a stub:// device)",
            device
        )
    }
}
