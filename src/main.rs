// Main entry point for the manga reader backend

use manga_reader::{
    api::{create_router, AppState, Capabilities},
    core::{Config, TranslationMethod},
    orchestration::{PipelineComponents, RegionPipeline},
    services::{
        detection::{BubbleDetector, DetectorRouter, OnnxDetector},
        ocr::{OcrService, TextRecognizer},
        storage::ImagePool,
        translation::{
            ChatBackend, DeeplClient, StatelessTranslator, TogetherChatClient, TranslationRouter,
        },
    },
    utils::Metrics,
};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

fn load_detector(
    name: &str,
    path: Option<&Path>,
    config: &Config,
) -> Option<Arc<dyn BubbleDetector>> {
    let path = path?;
    match OnnxDetector::from_file(
        name,
        path,
        config.detection.target_size,
        config.detection.intra_threads,
    ) {
        Ok(detector) => Some(Arc::new(detector)),
        Err(e) => {
            warn!("Detector {} disabled: {:#}", name, e);
            None
        }
    }
}

fn load_recognizer(config: &Config) -> Option<Arc<dyn TextRecognizer>> {
    let models_dir = &config.ocr.models_dir;
    if !OcrService::is_available(models_dir) {
        warn!("OCR models not found under {}, OCR disabled", models_dir.display());
        return None;
    }
    match OcrService::new(models_dir, config.detection.intra_threads) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            warn!("OCR disabled: {:#}", e);
            None
        }
    }
}

fn build_translator(config: &Config) -> Result<TranslationRouter> {
    let t = &config.translation;

    let chat: Option<Arc<dyn ChatBackend>> = match &t.together_api_key {
        Some(key) => Some(Arc::new(TogetherChatClient::new(
            key.as_str(),
            t.together_base_url.as_str(),
            t.together_model.as_str(),
        )?)),
        None => {
            warn!("TOGETHER_API_KEY not set, method1 disabled");
            None
        }
    };

    let stateless: Option<Arc<dyn StatelessTranslator>> = match &t.deepl_api_key {
        Some(key) => Some(Arc::new(DeeplClient::new(
            key.as_str(),
            t.deepl_base_url.clone(),
        )?)),
        None => {
            warn!("DEEPL_API_KEY not set, method2 disabled");
            None
        }
    };

    Ok(TranslationRouter::new(
        chat,
        stateless,
        t.target_lang.as_str(),
        t.backend_timeout,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::new().context("Failed to load configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_reader={},manga_reader_backend={},ort=off",
        config.log_level(),
        config.log_level()
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANGA READER BACKEND ===");

    let uploads = ImagePool::new(&config.storage.upload_dir, "/uploads");
    let artifacts = ImagePool::new(&config.storage.process_dir, "/process");
    uploads.ensure_dir().await?;
    artifacts.ensure_dir().await?;

    let model1 = load_detector("model1", config.detection.model1_path.as_deref(), &config);
    let model2 = load_detector("model2", config.detection.model2_path.as_deref(), &config);
    let recognizer = load_recognizer(&config);
    let translator = build_translator(&config)?;

    let capabilities = Capabilities {
        ocr: recognizer.is_some(),
        model1: model1.is_some(),
        model2: model2.is_some(),
        method1: translator.is_available(TranslationMethod::Contextual),
        method2: translator.is_available(TranslationMethod::Stateless),
    };
    info!("Capabilities: {:?}", capabilities);

    let metrics = Metrics::new();
    let pipeline = RegionPipeline::spawn(PipelineComponents {
        uploads,
        artifacts,
        detectors: Arc::new(DetectorRouter::new(model1, model2, config.backend_timeout())),
        recognizer,
        translator,
        ocr_timeout: config.backend_timeout(),
        metrics: metrics.clone(),
    });

    let app = create_router(AppState {
        pipeline,
        metrics,
        capabilities,
        max_upload_bytes: config.max_upload_bytes(),
    });

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                    - Root endpoint");
    info!("  GET  /health              - Health check and capabilities");
    info!("  GET  /metrics             - Prometheus metrics");
    info!("  GET  /stats               - Detailed statistics");
    info!("  POST /upload              - Upload an image or zip (multipart field 'file')");
    info!("  POST /clear               - Empty the image pool");
    info!("  GET  /uploads/:filename   - Fetch a pooled image");
    info!("  GET  /process/:filename   - Fetch a processed region");
    info!("  POST /process_region      - Crop, OCR and translate a region");
    info!("  POST /scan                - Detect text bubbles");
    info!("  POST /clear_cache         - Reset translation history and artifacts");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
