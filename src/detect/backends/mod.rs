pub mod mog2;
pub mod running_average;

pub use mog2::{Mog2Estimator, Mog2Params};
pub use running_average::RunningAverageEstimator;
