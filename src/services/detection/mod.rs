use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{BoundingBox, Detection, DetectorModel};
use crate::services::onnx_builder::build_cpu_session;
use anyhow::Result;
use image::DynamicImage;
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Minimum confidence for a box to be returned. Inclusive.
pub const CONFIDENCE_THRESHOLD: f32 = 0.30;

/// A bubble detection model.
///
/// Implementations return every raw box with its confidence, in model order.
/// Filtering happens in [`DetectorRouter`].
pub trait BubbleDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> DetectionResult<Vec<Detection>>;
}

/// Keep boxes at or above [`CONFIDENCE_THRESHOLD`], preserving order.
/// Overlapping boxes are all kept.
pub fn filter_by_confidence(detections: Vec<Detection>) -> Vec<BoundingBox> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= CONFIDENCE_THRESHOLD)
        .map(|d| d.bbox)
        .collect()
}

/// RT-DETR style ONNX detector.
///
/// Inputs `images` [1,3,S,S] and `orig_target_sizes` [1,2]; outputs `labels`,
/// `boxes` (already scaled to the original image) and `scores`.
pub struct OnnxDetector {
    session: Mutex<Session>,
    target_size: u32,
    name: String,
}

impl OnnxDetector {
    pub fn from_file(
        name: impl Into<String>,
        model_path: &Path,
        target_size: u32,
        intra_threads: usize,
    ) -> Result<Self> {
        let session = build_cpu_session(model_path, intra_threads)?;
        Ok(Self {
            session: Mutex::new(session),
            target_size,
            name: name.into(),
        })
    }

    fn preprocess_image(&self, img: &DynamicImage) -> (Array4<f32>, Array2<i64>) {
        let target_size = self.target_size;
        trace!(
            "Preprocessing image: {}x{} → {}x{}",
            img.width(),
            img.height(),
            target_size,
            target_size
        );

        let original_size: Array2<i64> =
            ndarray::arr2(&[[img.width() as i64, img.height() as i64]]);

        let resized = img.resize_exact(
            target_size,
            target_size,
            image::imageops::FilterType::Triangle,
        );
        let rgb_img = resized.to_rgb8();

        let target = target_size as usize;
        let mut array = Array4::<f32>::zeros((1, 3, target, target));

        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            array[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            array[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        (array, original_size)
    }
}

impl BubbleDetector for OnnxDetector {
    fn detect(&self, img: &DynamicImage) -> DetectionResult<Vec<Detection>> {
        if img.width() == 0 || img.height() == 0 {
            return Ok(Vec::new());
        }

        let (preprocessed, original_size) = self.preprocess_image(img);
        let images_value = Value::from_array(preprocessed)?;
        let sizes_value = Value::from_array(original_size)?;

        let inference_start = Instant::now();
        let (labels_shape, boxes_data, scores_data) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "images" => images_value,
                "orig_target_sizes" => sizes_value
            ])?;

            // Copy out while the session is held
            let (labels_shape, _labels) = outputs["labels"].try_extract_tensor::<i64>()?;
            let labels_shape = labels_shape.to_vec();
            let (_, boxes) = outputs["boxes"].try_extract_tensor::<f32>()?;
            let boxes = boxes.to_vec();
            let (_, scores) = outputs["scores"].try_extract_tensor::<f32>()?;
            let scores = scores.to_vec();

            (labels_shape, boxes, scores)
        };
        debug!(
            "[{}] inference completed in {:.2}ms",
            self.name,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let num_detections = match labels_shape.get(1) {
            Some(&n) if n >= 0 => n as usize,
            _ => {
                return Err(DetectionError::UnexpectedOutput(format!(
                    "labels shape {:?}",
                    labels_shape
                )))
            }
        };
        if boxes_data.len() < num_detections * 4 || scores_data.len() < num_detections {
            return Err(DetectionError::UnexpectedOutput(format!(
                "{} detections but {} box values and {} scores",
                num_detections,
                boxes_data.len(),
                scores_data.len()
            )));
        }

        let detections = (0..num_detections)
            .map(|i| Detection {
                bbox: BoundingBox {
                    x1: boxes_data[i * 4] as i32,
                    y1: boxes_data[i * 4 + 1] as i32,
                    x2: boxes_data[i * 4 + 2] as i32,
                    y2: boxes_data[i * 4 + 3] as i32,
                },
                confidence: scores_data[i],
            })
            .collect();

        Ok(detections)
    }
}

/// Two-way dispatch between the detection models.
///
/// Either model may be absent; selecting an absent one is an error for that
/// request only.
pub struct DetectorRouter {
    model1: Option<Arc<dyn BubbleDetector>>,
    model2: Option<Arc<dyn BubbleDetector>>,
    timeout: Duration,
}

impl DetectorRouter {
    pub fn new(
        model1: Option<Arc<dyn BubbleDetector>>,
        model2: Option<Arc<dyn BubbleDetector>>,
        timeout: Duration,
    ) -> Self {
        Self {
            model1,
            model2,
            timeout,
        }
    }

    pub fn is_available(&self, model: DetectorModel) -> bool {
        self.select(model).is_some()
    }

    fn select(&self, model: DetectorModel) -> Option<&Arc<dyn BubbleDetector>> {
        match model {
            DetectorModel::Model1 => self.model1.as_ref(),
            DetectorModel::Model2 => self.model2.as_ref(),
        }
    }

    /// Run the selected model on the blocking pool and filter its boxes.
    pub async fn scan(
        &self,
        image: Arc<DynamicImage>,
        model: DetectorModel,
    ) -> DetectionResult<Vec<BoundingBox>> {
        let detector = Arc::clone(
            self.select(model)
                .ok_or(DetectionError::ModelUnavailable(model))?,
        );

        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || detector.detect(&image));
        let raw = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| DetectionError::Timeout(self.timeout))?
            .map_err(|e| DetectionError::TaskJoinFailed(e.to_string()))??;

        let raw_count = raw.len();
        let boxes = filter_by_confidence(raw);
        debug!(
            "✓ Scan with {} in {:.2}ms: {}/{} boxes >= {:.2}",
            model,
            start.elapsed().as_secs_f64() * 1000.0,
            boxes.len(),
            raw_count,
            CONFIDENCE_THRESHOLD
        );
        Ok(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetector(Vec<Detection>);

    impl BubbleDetector for FixedDetector {
        fn detect(&self, _image: &DynamicImage) -> DetectionResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct SlowDetector;

    impl BubbleDetector for SlowDetector {
        fn detect(&self, _image: &DynamicImage) -> DetectionResult<Vec<Detection>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    fn det(i: i32, confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x1: i, y1: i, x2: i + 10, y2: i + 10 },
            confidence,
        }
    }

    fn blank() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgb8(32, 32))
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let kept = filter_by_confidence(vec![det(0, 0.1), det(1, 0.3), det(2, 0.35), det(3, 0.29)]);
        assert_eq!(kept, vec![det(1, 0.3).bbox, det(2, 0.35).bbox]);
    }

    #[test]
    fn test_overlapping_boxes_all_kept_in_order() {
        let kept = filter_by_confidence(vec![det(5, 0.9), det(5, 0.8), det(6, 0.95)]);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2], det(6, 0.0).bbox);
    }

    #[tokio::test]
    async fn test_router_dispatches_by_model() {
        let router = DetectorRouter::new(
            Some(Arc::new(FixedDetector(vec![det(1, 0.9)]))),
            Some(Arc::new(FixedDetector(vec![det(2, 0.9), det(3, 0.2)]))),
            Duration::from_secs(5),
        );

        let m1 = router.scan(blank(), DetectorModel::Model1).await.unwrap();
        let m2 = router.scan(blank(), DetectorModel::Model2).await.unwrap();

        assert_eq!(m1, vec![det(1, 0.0).bbox]);
        assert_eq!(m2, vec![det(2, 0.0).bbox]);
    }

    #[tokio::test]
    async fn test_no_detections_is_empty_not_error() {
        let router = DetectorRouter::new(
            Some(Arc::new(FixedDetector(vec![det(1, 0.05)]))),
            None,
            Duration::from_secs(5),
        );
        assert!(router.scan(blank(), DetectorModel::Model1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_model_is_reported() {
        let router = DetectorRouter::new(None, None, Duration::from_secs(5));
        assert!(!router.is_available(DetectorModel::Model2));
        let err = router.scan(blank(), DetectorModel::Model2).await.unwrap_err();
        assert!(matches!(err, DetectionError::ModelUnavailable(DetectorModel::Model2)));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let router = DetectorRouter::new(
            Some(Arc::new(SlowDetector)),
            None,
            Duration::from_millis(20),
        );
        let err = router.scan(blank(), DetectorModel::Model1).await.unwrap_err();
        assert!(matches!(err, DetectionError::Timeout(_)));
    }
}
