use anyhow::{anyhow, Result};

use crate::frame::{ForegroundMask, GrayFrame};

/// Foreground estimator trait.
///
/// An estimator keeps a running statistical model of the static background and
/// classifies each pixel of a new frame against it. The model is updated as a
/// side effect of every `estimate` call and accumulates for the lifetime of the
/// estimator; callers never reset it mid-run.
pub trait ForegroundEstimator: Send {
    /// Estimator identifier.
    fn name(&self) -> &'static str;

    /// Classify `frame` against the background model and fold it into the model.
    ///
    /// `learning_rate` weights how strongly this frame updates the model. A
    /// negative rate asks the estimator to pick one from its own history length.
    /// The returned mask has the same geometry as `frame`.
    fn estimate(&mut self, frame: &GrayFrame, learning_rate: f64) -> ForegroundMask;
}

impl<E: ForegroundEstimator + ?Sized> ForegroundEstimator for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn estimate(&mut self, frame: &GrayFrame, learning_rate: f64) -> ForegroundMask {
        (**self).estimate(frame, learning_rate)
    }
}

/// Estimators selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EstimatorKind {
    #[default]
    Mog2,
    RunningAverage,
}

impl EstimatorKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mog2" => Ok(Self::Mog2),
            "running-average" | "running_average" => Ok(Self::RunningAverage),
            other => Err(anyhow!(
                "unknown estimator '{}' (expected mog2 or running-average)",
                other
            )),
        }
    }

    pub fn build(self) -> Box<dyn ForegroundEstimator> {
        match self {
            Self::Mog2 => Box::new(super::Mog2Estimator::new()),
            Self::RunningAverage => Box::new(super::RunningAverageEstimator::new()),
        }
    }
}
