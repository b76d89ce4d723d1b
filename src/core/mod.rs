pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ConfigError, DetectionError, PipelineError, StorageError, TranslationError,
};
pub use types::{
    BoundingBox, ChatMessage, ChatRole, ClampedRegion, Detection, DetectorModel, Region,
    TranslationMethod,
};
