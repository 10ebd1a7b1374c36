use crate::detect::estimator::ForegroundEstimator;
use crate::frame::{ForegroundMask, GrayFrame, BACKGROUND, FOREGROUND};

const DEFAULT_THRESHOLD: f32 = 25.0;
const DEFAULT_HISTORY: u64 = 500;

/// Exponential running-average background with a fixed difference threshold.
///
/// Cheaper than the mixture model and blind to multi-modal backgrounds
/// (swaying foliage, flicker), but adequate for static indoor scenes.
pub struct RunningAverageEstimator {
    threshold: f32,
    width: u32,
    height: u32,
    background: Vec<f32>,
    frames: u64,
}

impl RunningAverageEstimator {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    /// `threshold` is the absolute intensity difference that marks foreground.
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            width: 0,
            height: 0,
            background: Vec::new(),
            frames: 0,
        }
    }
}

impl Default for RunningAverageEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundEstimator for RunningAverageEstimator {
    fn name(&self) -> &'static str {
        "running-average"
    }

    fn estimate(&mut self, frame: &GrayFrame, learning_rate: f64) -> ForegroundMask {
        if self.frames == 0 || frame.width != self.width || frame.height != self.height {
            self.width = frame.width;
            self.height = frame.height;
            self.background = frame.pixels().iter().map(|&p| p as f32).collect();
            self.frames = 1;
            return ForegroundMask::empty(frame.width, frame.height);
        }

        self.frames += 1;
        let alpha = if learning_rate.is_finite() && learning_rate >= 0.0 {
            learning_rate.min(1.0) as f32
        } else {
            1.0 / self.frames.min(DEFAULT_HISTORY) as f32
        };

        let threshold = self.threshold;
        let cells = frame
            .pixels()
            .iter()
            .zip(self.background.iter_mut())
            .map(|(&p, bg)| {
                let sample = p as f32;
                let moving = (sample - *bg).abs() > threshold;
                *bg += alpha * (sample - *bg);
                if moving {
                    FOREGROUND
                } else {
                    BACKGROUND
                }
            })
            .collect();

        ForegroundMask::from_cells(cells, frame.width, frame.height)
    }
}
