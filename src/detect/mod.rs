mod backends;
mod estimator;

pub use backends::{Mog2Estimator, Mog2Params, RunningAverageEstimator};
pub use estimator::{EstimatorKind, ForegroundEstimator};
