//! Frame and mask containers.
//!
//! - `ColorFrame`: packed RGB24 pixels as delivered by a frame source.
//! - `GrayFrame`: single-channel 8-bit intensity image.
//! - `ForegroundMask`: per-pixel foreground/background classification.
//!
//! Frames live for a single sampling tick. Nothing here is retained across ticks
//! except inside a `ForegroundEstimator`'s own model.

use anyhow::{anyhow, Result};

/// Mask value for a pixel classified as moving foreground.
pub const FOREGROUND: u8 = 255;
/// Mask value for a pixel that matches the learned background.
pub const BACKGROUND: u8 = 0;

// ----------------------------------------------------------------------------
// ColorFrame
// ----------------------------------------------------------------------------

/// Packed RGB24 frame (`width * height * 3` bytes, row-major).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ColorFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = pixel_count(width, height)?
            .checked_mul(3)
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Uniformly colored frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Convert to single-channel intensity.
    ///
    /// Uses the BT.601 luma weights in 14-bit fixed point, so the result matches
    /// what common vision libraries produce for RGB to gray.
    pub fn to_gray(&self) -> GrayFrame {
        const R_WEIGHT: u32 = 4899;
        const G_WEIGHT: u32 = 9617;
        const B_WEIGHT: u32 = 1868;
        const ROUND: u32 = 1 << 13;

        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = px[0] as u32 * R_WEIGHT
                    + px[1] as u32 * G_WEIGHT
                    + px[2] as u32 * B_WEIGHT
                    + ROUND;
                (y >> 14) as u8
            })
            .collect();

        GrayFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

// ----------------------------------------------------------------------------
// GrayFrame
// ----------------------------------------------------------------------------

/// Single-channel intensity frame (`width * height` bytes, row-major).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = pixel_count(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "gray frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Histogram equalization (contrast normalization).
    ///
    /// The darkest occupied bin maps to 0 and the cumulative distribution of the
    /// remaining bins is stretched across 0..=255. A frame with a single intensity
    /// is returned unchanged.
    pub fn equalize_histogram(&self) -> GrayFrame {
        let mut hist = [0usize; 256];
        for &p in &self.data {
            hist[p as usize] += 1;
        }

        let total = self.data.len();
        let Some(first) = hist.iter().position(|&count| count > 0) else {
            return self.clone();
        };
        if hist[first] == total {
            return self.clone();
        }

        let scale = 255.0 / (total - hist[first]) as f64;
        let mut lut = [0u8; 256];
        let mut sum = 0usize;
        for i in (first + 1)..256 {
            sum += hist[i];
            lut[i] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
        }

        GrayFrame {
            data: self.data.iter().map(|&p| lut[p as usize]).collect(),
            width: self.width,
            height: self.height,
        }
    }
}

// ----------------------------------------------------------------------------
// ForegroundMask
// ----------------------------------------------------------------------------

/// Binary foreground mask. Every cell is either `FOREGROUND` or `BACKGROUND`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForegroundMask {
    cells: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ForegroundMask {
    /// Mask with every cell set to background.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            cells: vec![BACKGROUND; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    /// Build a mask from per-cell flags (`true` = foreground).
    pub fn from_flags(flags: &[bool], width: u32, height: u32) -> Result<Self> {
        let expected = pixel_count(width, height)?;
        if flags.len() != expected {
            return Err(anyhow!(
                "mask length mismatch: expected {}, got {}",
                expected,
                flags.len()
            ));
        }
        Ok(Self {
            cells: flags
                .iter()
                .map(|&fg| if fg { FOREGROUND } else { BACKGROUND })
                .collect(),
            width,
            height,
        })
    }

    pub(crate) fn from_cells(cells: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(cells.len(), (width as usize) * (height as usize));
        Self {
            cells,
            width,
            height,
        }
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
        let idx = (y as usize) * (self.width as usize) + (x as usize);
        self.cells[idx] = if foreground { FOREGROUND } else { BACKGROUND };
    }

    pub fn foreground_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == FOREGROUND).count()
    }

    /// Fraction of cells marked foreground, in [0, 1].
    ///
    /// The denominator is the mask's own geometry, not the configured capture
    /// size. An empty mask has no motion.
    pub fn motion_ratio(&self) -> f64 {
        let total = (self.height as usize) * (self.width as usize);
        if total == 0 {
            return 0.0;
        }
        self.foreground_count() as f64 / total as f64
    }
}

fn pixel_count(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_frame_rejects_wrong_length() {
        assert!(ColorFrame::new(vec![0u8; 10], 2, 2).is_err());
        assert!(ColorFrame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn gray_conversion_uses_luma_weights() {
        let white = ColorFrame::filled(2, 1, [255, 255, 255]).to_gray();
        assert_eq!(white.pixels(), &[255, 255]);

        let red = ColorFrame::filled(1, 1, [255, 0, 0]).to_gray();
        assert_eq!(red.pixels(), &[76]);

        let green = ColorFrame::filled(1, 1, [0, 255, 0]).to_gray();
        assert_eq!(green.pixels(), &[150]);

        let blue = ColorFrame::filled(1, 1, [0, 0, 255]).to_gray();
        assert_eq!(blue.pixels(), &[29]);
    }

    #[test]
    fn equalization_stretches_to_full_range() -> Result<()> {
        let gray = GrayFrame::new(vec![100, 100, 101, 102], 2, 2)?;
        let eq = gray.equalize_histogram();
        assert_eq!(eq.pixels(), &[0, 0, 128, 255]);
        assert_eq!((eq.width, eq.height), (2, 2));
        Ok(())
    }

    #[test]
    fn equalization_leaves_flat_frame_unchanged() -> Result<()> {
        let gray = GrayFrame::new(vec![42; 6], 3, 2)?;
        assert_eq!(gray.equalize_histogram(), gray);
        Ok(())
    }

    #[test]
    fn motion_ratio_bounds() {
        let mut mask = ForegroundMask::empty(4, 4);
        assert_eq!(mask.motion_ratio(), 0.0);

        for y in 0..4 {
            for x in 0..4 {
                mask.set(x, y, true);
            }
        }
        assert_eq!(mask.motion_ratio(), 1.0);
    }

    #[test]
    fn motion_ratio_counts_foreground_cells() {
        let mut mask = ForegroundMask::empty(100, 100);
        for i in 0..20 {
            mask.set(i, 0, true);
        }
        assert_eq!(mask.foreground_count(), 20);
        assert!((mask.motion_ratio() - 0.002).abs() < 1e-12);
    }

    #[test]
    fn motion_ratio_of_empty_geometry_is_zero() {
        let mask = ForegroundMask::empty(0, 0);
        assert_eq!(mask.motion_ratio(), 0.0);
    }
}
