//! Synthetic frame source for `stub://` devices.
//!
//! Renders a static textured background with a little sensor noise. Every
//! `visit_every` frames a bright block (an "animal") crosses the scene for
//! `visit_length` frames. With `drop_every` set, every Nth capture fails, which
//! exercises the skipped-tick path.
//!
//! Options ride on the device string:
//! `stub://garden?visit_every=40&visit_length=8&drop_every=0&noise=2`

use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;

use super::{FrameSource, SourceStats};
use crate::frame::ColorFrame;

/// Scene parameters for `SyntheticSource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub device: String,
    pub visit_every: u64,
    pub visit_length: u64,
    /// Fail every Nth capture (0 = never).
    pub drop_every: u64,
    /// Peak per-pixel noise amplitude.
    pub noise: u8,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            device: "stub://scene".to_string(),
            visit_every: 40,
            visit_length: 8,
            drop_every: 0,
            noise: 2,
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://name?key=value&...`.
    pub fn from_device(device: &str) -> Result<Self> {
        let rest = device
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic device must start with stub:// (got {})", device))?;
        let mut cfg = Self {
            device: device.to_string(),
            ..Self::default()
        };

        let Some((_, query)) = rest.split_once('?') else {
            return Ok(cfg);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub option '{}'", pair))?;
            match key {
                "visit_every" => cfg.visit_every = parse_opt(key, value)?,
                "visit_length" => cfg.visit_length = parse_opt(key, value)?,
                "drop_every" => cfg.drop_every = parse_opt(key, value)?,
                "noise" => cfg.noise = parse_opt(key, value)?,
                other => bail!("unknown stub option '{}'", other),
            }
        }
        Ok(cfg)
    }
}

fn parse_opt<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value '{}' for stub option {}", value, key))
}

/// Reproducible scene layout with periodic intruders. Pixel noise is random
/// unless `noise=0`.
pub struct SyntheticSource {
    config: SyntheticConfig,
    width: u32,
    height: u32,
    configured: bool,
    ticks: u64,
    stats: SourceStats,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let stats = SourceStats {
            device: config.device.clone(),
            ..SourceStats::default()
        };
        Self {
            config,
            width: 0,
            height: 0,
            configured: false,
            ticks: 0,
            stats,
        }
    }

    /// True while an intruder is in frame for capture number `tick`.
    pub fn visiting(&self, tick: u64) -> bool {
        self.config.visit_every > 0
            && tick >= self.config.visit_every
            && tick % self.config.visit_every < self.config.visit_length
    }

    fn render(&self, tick: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut rng = rand::thread_rng();
        let noise = self.config.noise as i16;
        let mut pixels = Vec::with_capacity(w * h * 3);

        for y in 0..h {
            for x in 0..w {
                let base = 40 + ((x * 97 + y * 53) % 120) as i16;
                let jitter = if noise > 0 {
                    rng.gen_range(-noise..=noise)
                } else {
                    0
                };
                let v = (base + jitter).clamp(0, 255) as u8;
                pixels.extend_from_slice(&[v, v.saturating_add(10), v.saturating_sub(10)]);
            }
        }

        if self.visiting(tick) {
            // Half-height block sweeping left to right.
            let bw = (w / 2).max(1);
            let bh = (h / 2).max(1);
            let span = w.saturating_sub(bw).max(1);
            let phase = (tick % self.config.visit_every) as usize;
            let x0 = (phase * span / self.config.visit_length.max(1) as usize).min(w - bw);
            let y0 = (h - bh) / 2;
            for y in y0..y0 + bh {
                for x in x0..x0 + bw {
                    let idx = (y * w + x) * 3;
                    pixels[idx..idx + 3].copy_from_slice(&[250, 245, 235]);
                }
            }
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn configure(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            bail!("synthetic source needs a non-empty geometry");
        }
        self.width = width;
        self.height = height;
        self.configured = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.device,
            width,
            height
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<ColorFrame> {
        if !self.configured {
            bail!("synthetic source {} not configured", self.config.device);
        }
        self.ticks += 1;
        if self.config.drop_every > 0 && self.ticks % self.config.drop_every == 0 {
            self.stats.frames_failed += 1;
            bail!("synthetic frame {} dropped", self.ticks);
        }

        let frame = ColorFrame::new(self.render(self.ticks), self.width, self.height)?;
        self.stats.frames_captured += 1;
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
