//! V4L2 frame source.
//!
//! `V4l2Source` opens a local device node (e.g. /dev/video0), negotiates a
//! capture geometry and pixel format, and streams frames through memory-mapped
//! buffers. Frames are normalized to RGB24 regardless of the device format.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::ColorFrame;

/// Number of memory-mapped capture buffers.
const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Source {
    device: String,
    state: Option<V4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    stats: SourceStats,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            state: None,
            format: PixelFormat::Rgb24,
            active_width: 0,
            active_height: 0,
            stats: SourceStats {
                device: device.to_string(),
                ..SourceStats::default()
            },
        }
    }

    fn pixel_format(fourcc: v4l::FourCC) -> Result<PixelFormat> {
        match &fourcc.repr {
            b"RGB3" => Ok(PixelFormat::Rgb24),
            b"YUYV" => Ok(PixelFormat::Yuyv),
            b"NV12" => Ok(PixelFormat::Nv12),
            _ => Err(anyhow!(
                "unsupported v4l2 pixel format {} (need RGB3, YUYV or NV12)",
                fourcc
            )),
        }
    }
}

impl FrameSource for V4l2Source {
    fn configure(&mut self, width: u32, height: u32) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if format.width != width || format.height != height {
            log::warn!(
                "V4l2Source: {} rejected {}x{}, capturing at {}x{}",
                self.device,
                width,
                height,
                format.width,
                format.height
            );
        }

        self.format = Self::pixel_format(format.fourcc)?;
        self.active_width = format.width;
        self.active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<ColorFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not configured")?;
        let rgb = state
            .with_mut(|fields| {
                let (buf, meta) = fields.stream.next()?;
                let used = meta.bytesused as usize;
                let bytes = if used > 0 && used <= buf.len() {
                    &buf[..used]
                } else {
                    buf
                };
                Ok::<_, std::io::Error>(bytes.to_vec())
            })
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"));

        let frame = rgb.and_then(|raw| {
            let pixels = normalize_to_rgb(&raw, self.active_width, self.active_height, self.format)?;
            ColorFrame::new(pixels, self.active_width, self.active_height)
        });

        match &frame {
            Ok(_) => self.stats.frames_captured += 1,
            Err(_) => self.stats.frames_failed += 1,
        }
        frame
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
