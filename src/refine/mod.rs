//! Point-cloud refinement of the best candidate's position.

pub mod estimator;
pub mod refiner;

pub use estimator::{Centroid, EstimatorKind, HighestPoint, RefinedPointEstimator};
pub use refiner::{PointCloudRefiner, RefinerConfig, Refinement};
