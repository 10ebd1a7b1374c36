//! Adaptive Gaussian mixture background model.
//!
//! Every pixel keeps up to `n_mixtures` Gaussian components sorted by weight.
//! The heaviest components whose weights sum to `background_ratio` describe the
//! background; a sample within `var_threshold` squared deviations of one of them
//! is background. Samples that fit no component spawn a new one, and components
//! whose weight decays below the complexity-reduction prior are dropped.
//!
//! Samples that look like a darkened copy of the background are classified as
//! shadows and reported as background.

use crate::detect::estimator::ForegroundEstimator;
use crate::frame::{ForegroundMask, GrayFrame, BACKGROUND, FOREGROUND};

/// Tuning parameters for `Mog2Estimator`.
#[derive(Clone, Debug, PartialEq)]
pub struct Mog2Params {
    /// Frames of history used to derive the automatic learning rate.
    pub history: u32,
    /// Maximum Gaussian components per pixel.
    pub n_mixtures: usize,
    /// Squared Mahalanobis distance below which a sample is background.
    pub var_threshold: f32,
    /// Cumulative weight of components treated as background.
    pub background_ratio: f32,
    /// Squared Mahalanobis distance below which a sample updates a component.
    pub var_threshold_gen: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Prior that prunes components which stop receiving support.
    pub complexity_reduction: f32,
    pub detect_shadows: bool,
    /// Minimum brightness ratio for a sample to count as a shadow.
    pub shadow_threshold: f32,
}

impl Default for Mog2Params {
    fn default() -> Self {
        Self {
            history: 500,
            n_mixtures: 5,
            var_threshold: 16.0,
            background_ratio: 0.9,
            var_threshold_gen: 9.0,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_threshold: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Gaussian {
    weight: f32,
    mean: f32,
    variance: f32,
}

/// Gaussian mixture foreground estimator.
pub struct Mog2Estimator {
    params: Mog2Params,
    width: u32,
    height: u32,
    /// `n_mixtures` slots per pixel, heaviest first.
    components: Vec<Gaussian>,
    /// Live component count per pixel.
    modes_used: Vec<u8>,
    frames: u64,
}

impl Mog2Estimator {
    pub fn new() -> Self {
        Self::with_params(Mog2Params::default())
    }

    pub fn with_params(mut params: Mog2Params) -> Self {
        params.n_mixtures = params.n_mixtures.clamp(1, u8::MAX as usize);
        params.history = params.history.max(1);
        Self {
            params,
            width: 0,
            height: 0,
            components: Vec::new(),
            modes_used: Vec::new(),
            frames: 0,
        }
    }

    pub fn params(&self) -> &Mog2Params {
        &self.params
    }

    /// Frames folded into the current model.
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    fn reinitialize(&mut self, width: u32, height: u32) {
        let pixels = (width as usize) * (height as usize);
        self.width = width;
        self.height = height;
        self.components = vec![Gaussian::default(); pixels * self.params.n_mixtures];
        self.modes_used = vec![0; pixels];
        self.frames = 0;
    }

    fn effective_rate(&self, learning_rate: f64) -> f32 {
        if learning_rate.is_finite() && learning_rate >= 0.0 && self.frames > 1 {
            learning_rate as f32
        } else {
            let span = (2 * self.frames).min(self.params.history as u64).max(1);
            1.0 / span as f32
        }
    }
}

impl Default for Mog2Estimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundEstimator for Mog2Estimator {
    fn name(&self) -> &'static str {
        "mog2"
    }

    fn estimate(&mut self, frame: &GrayFrame, learning_rate: f64) -> ForegroundMask {
        if self.frames == 0 || frame.width != self.width || frame.height != self.height {
            if self.frames > 0 {
                log::info!(
                    "mog2: frame geometry changed {}x{} -> {}x{}, relearning background",
                    self.width,
                    self.height,
                    frame.width,
                    frame.height
                );
            }
            self.reinitialize(frame.width, frame.height);
        }

        self.frames += 1;
        let alpha = self.effective_rate(learning_rate);
        let n_mixtures = self.params.n_mixtures;

        let mut cells = Vec::with_capacity(frame.len());
        for ((&sample, gmm), modes) in frame
            .pixels()
            .iter()
            .zip(self.components.chunks_exact_mut(n_mixtures))
            .zip(self.modes_used.iter_mut())
        {
            let mut n_modes = *modes as usize;
            let foreground = update_pixel(&self.params, gmm, &mut n_modes, sample as f32, alpha);
            *modes = n_modes as u8;
            cells.push(if foreground { FOREGROUND } else { BACKGROUND });
        }

        ForegroundMask::from_cells(cells, frame.width, frame.height)
    }
}

/// Update one pixel's mixture with `sample` and classify it.
///
/// Returns true when the sample is foreground. Shadows are background.
fn update_pixel(
    params: &Mog2Params,
    gmm: &mut [Gaussian],
    n_modes: &mut usize,
    sample: f32,
    alpha: f32,
) -> bool {
    let alpha1 = 1.0 - alpha;
    let prune = -alpha * params.complexity_reduction;

    let mut background = false;
    let mut fits = false;
    let mut total_weight = 0.0f32;
    let mut modes = *n_modes;

    let mut mode = 0;
    while mode < modes {
        let mut weight = alpha1 * gmm[mode].weight + prune;
        let mut swaps = 0;

        if !fits {
            let variance = gmm[mode].variance;
            let diff = gmm[mode].mean - sample;
            let dist2 = diff * diff;

            if total_weight < params.background_ratio && dist2 < params.var_threshold * variance {
                background = true;
            }

            if dist2 < params.var_threshold_gen * variance {
                fits = true;
                weight += alpha;
                let k = alpha / weight;
                gmm[mode].mean -= k * diff;
                gmm[mode].variance =
                    (variance + k * (dist2 - variance)).clamp(params.var_min, params.var_max);

                // Keep components sorted by weight.
                let mut i = mode;
                while i > 0 && weight >= gmm[i - 1].weight {
                    gmm.swap(i, i - 1);
                    swaps += 1;
                    i -= 1;
                }
            }
        }

        if weight < -prune {
            weight = 0.0;
            modes -= 1;
        }

        gmm[mode - swaps].weight = weight;
        total_weight += weight;
        mode += 1;
    }

    if total_weight > 0.0 {
        let norm = 1.0 / total_weight;
        for g in gmm.iter_mut().take(modes) {
            g.weight *= norm;
        }
    }

    if !fits {
        let slot = if modes == params.n_mixtures {
            modes - 1
        } else {
            modes += 1;
            modes - 1
        };

        if modes == 1 {
            gmm[slot].weight = 1.0;
        } else {
            gmm[slot].weight = alpha;
            for g in gmm.iter_mut().take(modes - 1) {
                g.weight *= alpha1;
            }
        }
        gmm[slot].mean = sample;
        gmm[slot].variance = params.var_init;

        let mut i = modes - 1;
        while i > 0 && alpha >= gmm[i - 1].weight {
            gmm.swap(i, i - 1);
            i -= 1;
        }
    }

    *n_modes = modes;

    if background {
        return false;
    }
    !(params.detect_shadows && is_shadow(params, &gmm[..modes], sample))
}

fn is_shadow(params: &Mog2Params, gmm: &[Gaussian], sample: f32) -> bool {
    let mut weight = 0.0f32;
    for g in gmm {
        let numerator = g.mean * sample;
        let denominator = g.mean * g.mean;
        if denominator == 0.0 {
            return false;
        }

        if numerator <= denominator && numerator >= params.shadow_threshold * denominator {
            let a = numerator / denominator;
            let diff = a * g.mean - sample;
            if diff * diff < params.var_threshold * g.variance * a * a {
                return true;
            }
        }

        weight += g.weight;
        if weight > params.background_ratio {
            return false;
        }
    }
    false
}
