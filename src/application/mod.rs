//! Application Layer - Pipeline orchestration

pub mod pipeline;

pub use pipeline::{PipelineError, PipelineStatus, ScanPipeline};
