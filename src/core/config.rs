use crate::core::errors::ConfigError;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Largest accepted request body, in megabytes
    pub max_upload_mb: usize,
}

/// Image pool and processed-artifact directories
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub process_dir: PathBuf,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// ONNX model behind the "model1" selector; unset disables it
    pub model1_path: Option<PathBuf>,
    /// ONNX model behind the "model2" selector; unset disables it
    pub model2_path: Option<PathBuf>,
    pub target_size: u32,
    pub intra_threads: usize,
}

/// OCR configuration
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub models_dir: PathBuf,
}

/// Translation backend configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub together_api_key: Option<String>,
    pub together_model: String,
    pub together_base_url: String,
    pub deepl_api_key: Option<String>,
    pub deepl_base_url: Option<String>,
    pub target_lang: String,
    pub backend_timeout: Duration,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub detection: DetectionConfig,
    pub ocr: OcrConfig,
    pub translation: TranslationConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT").unwrap_or(5000),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
                max_upload_mb: env_parse("MAX_UPLOAD_MB").unwrap_or(200),
            },
            storage: StorageConfig {
                upload_dir: env_non_empty("UPLOAD_DIR")
                    .unwrap_or_else(|| "uploads".to_string())
                    .into(),
                process_dir: env_non_empty("PROCESS_DIR")
                    .unwrap_or_else(|| "process".to_string())
                    .into(),
            },
            detection: DetectionConfig {
                model1_path: env_non_empty("DETECTOR_MODEL1_PATH").map(PathBuf::from),
                model2_path: env_non_empty("DETECTOR_MODEL2_PATH").map(PathBuf::from),
                target_size: env_parse("TARGET_SIZE").unwrap_or(640),
                intra_threads: env_parse("ONNX_INTRA_THREADS").unwrap_or_else(num_cpus::get),
            },
            ocr: OcrConfig {
                models_dir: env_non_empty("MODELS_DIR")
                    .unwrap_or_else(|| "models".to_string())
                    .into(),
            },
            translation: TranslationConfig {
                together_api_key: env_non_empty("TOGETHER_API_KEY"),
                together_model: env_non_empty("TOGETHER_MODEL").unwrap_or_else(|| {
                    "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free".to_string()
                }),
                together_base_url: env_non_empty("TOGETHER_BASE_URL")
                    .unwrap_or_else(|| "https://api.together.xyz/v1".to_string()),
                deepl_api_key: env_non_empty("DEEPL_API_KEY"),
                deepl_base_url: env_non_empty("DEEPL_BASE_URL"),
                target_lang: env_non_empty("TARGET_LANG").unwrap_or_else(|| "EN-US".to_string()),
                backend_timeout: Duration::from_secs(
                    env_parse("BACKEND_TIMEOUT_SECONDS").unwrap_or(120),
                ),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "MAX_UPLOAD_MB must be > 0".to_string(),
            ));
        }

        if !(320..=2048).contains(&self.detection.target_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "target_size must be between 320 and 2048, got {}",
                self.detection.target_size
            )));
        }

        if self.detection.intra_threads == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "ONNX_INTRA_THREADS must be > 0".to_string(),
            ));
        }

        for path in [&self.detection.model1_path, &self.detection.model2_path]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                return Err(ConfigError::InvalidDetectionConfig(format!(
                    "detector model not found at {}",
                    path.display()
                )));
            }
        }

        if self.translation.backend_timeout.is_zero() {
            return Err(ConfigError::InvalidTranslationConfig(
                "BACKEND_TIMEOUT_SECONDS must be > 0".to_string(),
            ));
        }

        if self.storage.upload_dir == self.storage.process_dir {
            return Err(ConfigError::InvalidStoragePath(
                "UPLOAD_DIR and PROCESS_DIR must differ".to_string(),
            ));
        }

        for dir in [&self.storage.upload_dir, &self.storage.process_dir] {
            Self::validate_parent_exists(dir)?;
        }

        Ok(())
    }

    fn validate_parent_exists(dir: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = dir.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidStoragePath(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb * 1024 * 1024
    }

    pub fn backend_timeout(&self) -> Duration {
        self.translation.backend_timeout
    }
}

// No Default implementation: Config::new() validates and can fail
