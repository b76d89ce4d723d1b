// Library exports for the manga reader backend: region OCR, bubble
// detection and translation behind an HTTP API

pub mod api;
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{ConfigError, DetectionError, PipelineError, StorageError, TranslationError},
    types::{BoundingBox, DetectorModel, Region, TranslationMethod},
};

pub use orchestration::{PipelineComponents, RegionPipeline};

pub use utils::Metrics;
