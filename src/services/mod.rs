pub mod detection;
pub mod ocr;
pub mod onnx_builder; // Shared CPU session builder for detector and OCR models
pub mod storage;
pub mod translation;

// Re-export commonly used services
pub use detection::{DetectorRouter, OnnxDetector};
pub use ocr::OcrService;
pub use storage::ImagePool;
pub use translation::TranslationRouter;
