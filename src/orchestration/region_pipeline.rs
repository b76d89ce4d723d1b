// Region pipeline: crop -> OCR -> translate on a single worker, scans alongside

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{DynamicImage, GenericImageView};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{
    BoundingBox, ClearSummary, DetectorModel, ProcessRegionRequest, ProcessRegionResponse,
    ScanRequest, TranslationMethod,
};
use crate::services::detection::DetectorRouter;
use crate::services::ocr::TextRecognizer;
use crate::services::storage::ImagePool;
use crate::services::translation::TranslationRouter;
use crate::utils::{crop_region_async, load_image_from_memory_async, Metrics};

const COMMAND_QUEUE_DEPTH: usize = 64;

/// Everything the pipeline needs, handed over once at startup
pub struct PipelineComponents {
    pub uploads: ImagePool,
    pub artifacts: ImagePool,
    pub detectors: Arc<DetectorRouter>,
    pub recognizer: Option<Arc<dyn TextRecognizer>>,
    pub translator: TranslationRouter,
    pub ocr_timeout: Duration,
    pub metrics: Metrics,
}

enum Command {
    ProcessRegion {
        request: ProcessRegionRequest,
        reply: oneshot::Sender<PipelineResult<ProcessRegionResponse>>,
    },
    ClearCache {
        reply: oneshot::Sender<PipelineResult<ClearSummary>>,
    },
    HistoryLen {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the region worker.
///
/// `process_region` and `clear_cache` are queued to one worker task that owns
/// the translation history, so they run strictly first-come-first-served.
/// `scan` never touches history and runs on the caller's task.
#[derive(Clone)]
pub struct RegionPipeline {
    tx: mpsc::Sender<Command>,
    uploads: ImagePool,
    artifacts: ImagePool,
    detectors: Arc<DetectorRouter>,
    metrics: Metrics,
}

struct RegionWorker {
    uploads: ImagePool,
    artifacts: ImagePool,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    translator: TranslationRouter,
    ocr_timeout: Duration,
    metrics: Metrics,
}

impl RegionPipeline {
    /// Start the worker on the current runtime and return a handle to it
    pub fn spawn(components: PipelineComponents) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        let handle = Self {
            tx,
            uploads: components.uploads.clone(),
            artifacts: components.artifacts.clone(),
            detectors: components.detectors,
            metrics: components.metrics.clone(),
        };

        let worker = RegionWorker {
            uploads: components.uploads,
            artifacts: components.artifacts,
            recognizer: components.recognizer,
            translator: components.translator,
            ocr_timeout: components.ocr_timeout,
            metrics: components.metrics,
        };
        tokio::spawn(worker.run(rx));

        handle
    }

    pub fn uploads(&self) -> &ImagePool {
        &self.uploads
    }

    pub fn artifacts(&self) -> &ImagePool {
        &self.artifacts
    }

    pub fn detectors(&self) -> &DetectorRouter {
        &self.detectors
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> PipelineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| PipelineError::WorkerUnavailable)?;
        rx.await.map_err(|_| PipelineError::WorkerUnavailable)
    }

    pub async fn process_region(
        &self,
        request: ProcessRegionRequest,
    ) -> PipelineResult<ProcessRegionResponse> {
        let result = self
            .call(|reply| Command::ProcessRegion { request, reply })
            .await
            .and_then(|r| r);
        self.metrics.record_region(result.is_ok());
        result
    }

    /// Delete processed artifacts and reset the conversation
    pub async fn clear_cache(&self) -> PipelineResult<ClearSummary> {
        self.call(|reply| Command::ClearCache { reply }).await?
    }

    pub async fn history_len(&self) -> PipelineResult<usize> {
        self.call(|reply| Command::HistoryLen { reply }).await
    }

    /// Detect text regions on a pooled page
    #[instrument(skip(self, request), fields(image = %request.image, model = %request.method))]
    pub async fn scan(&self, request: &ScanRequest) -> PipelineResult<Vec<BoundingBox>> {
        let bytes = self.uploads.read(&request.image).await?;
        let image = load_image_from_memory_async(bytes)
            .await
            .map_err(PipelineError::ImageProcessing)?;

        let start = Instant::now();
        let result = self.detectors.scan(Arc::new(image), request.method).await;
        self.metrics
            .record_backend_call(detect_label(request.method), result.is_ok(), start.elapsed());

        let boxes = result?;
        self.metrics.record_scan(boxes.len());
        info!("Scan found {} boxes", boxes.len());
        Ok(boxes)
    }
}

fn detect_label(model: DetectorModel) -> &'static str {
    match model {
        DetectorModel::Model1 => "detect:model1",
        DetectorModel::Model2 => "detect:model2",
    }
}

fn translate_label(method: TranslationMethod) -> &'static str {
    match method {
        TranslationMethod::Contextual => "translate:method1",
        TranslationMethod::Stateless => "translate:method2",
    }
}

impl RegionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Region worker started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::ProcessRegion { request, reply } => {
                    let result = self.process_region(request).await;
                    if let Err(e) = &result {
                        error!("Region processing failed: {}", e);
                    }
                    if reply.send(result).is_err() {
                        debug!("Caller went away before the region result was ready");
                    }
                }
                Command::ClearCache { reply } => {
                    if reply.send(self.clear_cache().await).is_err() {
                        debug!("Caller went away before the cache clear finished");
                    }
                }
                Command::HistoryLen { reply } => {
                    if reply.send(self.translator.history().len()).is_err() {
                        debug!("Caller went away before the history length was sent");
                    }
                }
            }
        }
        info!("Region worker stopped");
    }

    #[instrument(skip(self, request), fields(image = %request.image, method = %request.method))]
    async fn process_region(
        &mut self,
        request: ProcessRegionRequest,
    ) -> PipelineResult<ProcessRegionResponse> {
        let start = Instant::now();

        let bytes = self.uploads.read(&request.image).await?;
        let page = load_image_from_memory_async(bytes)
            .await
            .map_err(PipelineError::ImageProcessing)?;

        let (width, height) = page.dimensions();
        let region = request.region.clamp(width, height);
        debug!("Region {:?} clamped to {:?} on {}x{}", request.region, region, width, height);

        let (cropped, png) = crop_region_async(Arc::new(page), region)
            .await
            .map_err(PipelineError::ImageProcessing)?;

        let artifact_name = format!("processed_{}.png", Uuid::new_v4());
        self.artifacts.write(&artifact_name, &png).await?;

        let text = self.recognize(cropped).await?;
        info!("OCR text: {:?}", text);

        let translate_start = Instant::now();
        let translation = self.translator.translate(&text, request.method).await;
        self.metrics.record_backend_call(
            translate_label(request.method),
            translation.is_ok(),
            translate_start.elapsed(),
        );
        let translated_text = translation?;

        info!(
            "Region processed in {:.2}s: {:?} -> {:?}",
            start.elapsed().as_secs_f64(),
            text,
            translated_text
        );

        Ok(ProcessRegionResponse {
            message: "Region processed successfully".to_string(),
            processed_image: self.artifacts.url_for(&artifact_name),
            text,
            translated_text,
        })
    }

    async fn recognize(&self, cropped: DynamicImage) -> PipelineResult<String> {
        let recognizer = self
            .recognizer
            .clone()
            .ok_or(PipelineError::OcrUnavailable)?;

        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || recognizer.recognize(&cropped));
        let result = match tokio::time::timeout(self.ocr_timeout, task).await {
            Err(_) => Err(PipelineError::Timeout {
                stage: "OCR",
                after: self.ocr_timeout,
            }),
            Ok(Err(e)) => Err(PipelineError::TaskJoinFailed(e.to_string())),
            Ok(Ok(recognized)) => recognized.map_err(PipelineError::OcrFailed),
        };
        self.metrics
            .record_backend_call("ocr", result.is_ok(), start.elapsed());
        result
    }

    async fn clear_cache(&mut self) -> PipelineResult<ClearSummary> {
        self.translator.reset_history();
        self.metrics.record_history_reset();

        let summary = self.artifacts.clear().await.inspect_err(|e| {
            warn!("History reset but artifact cleanup failed: {}", e);
        })?;
        info!(
            "Translation cache cleared: {} artifacts removed",
            summary.files_removed
        );
        Ok(summary)
    }
}
