pub mod engine;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod validate;

pub use crate::domain::model::{EvalMetrics, FeatureSet, ForecastReport, SeriesFrame};
pub use crate::domain::ports::{Pipeline, SeriesSource, Storage};
pub use crate::utils::error::Result;
