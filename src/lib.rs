pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::storage::LocalStorage;
pub use config::TomlConfig;
pub use core::{engine::ForecastEngine, pipeline::ForecastPipeline};
pub use utils::error::{PipelineError, Result};
