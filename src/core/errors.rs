// Custom error types for the region pipeline
//
// thiserror enums per concern, chained into PipelineError at the orchestrator
// boundary. HTTP status mapping lives in api::error.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::{DetectorModel, TranslationMethod};

/// Image pool / artifact store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("File type not allowed: {0}")]
    UnsupportedExtension(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl StorageError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Detection service errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("Unexpected detector output: {0}")]
    UnexpectedOutput(String),

    #[error("Detection model {0} is not configured")]
    ModelUnavailable(DetectorModel),

    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Translation backend errors
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("API request failed: {0}")]
    ApiRequestFailed(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Translation backend for {0} is not configured")]
    BackendUnavailable(TranslationMethod),

    #[error("Translation timed out after {0:?}")]
    Timeout(Duration),
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Image processing failed: {0}")]
    ImageProcessing(#[source] anyhow::Error),

    #[error("OCR is not available (model not loaded)")]
    OcrUnavailable,

    #[error("OCR failed: {0}")]
    OcrFailed(#[source] anyhow::Error),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Translation failed: {0}")]
    Translation(#[from] TranslationError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),

    #[error("Region worker is not running")]
    WorkerUnavailable,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid translation config: {0}")]
    InvalidTranslationConfig(String),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    #[error("Invalid server config: {0}")]
    InvalidServerConfig(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
