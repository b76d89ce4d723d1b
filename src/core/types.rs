// Shared types for the region pipeline and its HTTP surface

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image formats accepted into the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Match on the filename extension, case-insensitive
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

/// What a single uploaded file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Archive,
    Image(ImageFormat),
}

impl UploadKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        if let Some(format) = ImageFormat::from_filename(filename) {
            return Some(Self::Image(format));
        }
        let (_, ext) = filename.rsplit_once('.')?;
        ext.eq_ignore_ascii_case("zip").then_some(Self::Archive)
    }
}

/// Translation backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationMethod {
    /// Streaming chat model that sees the running conversation
    #[serde(rename = "method1")]
    Contextual,
    /// One-shot machine translation, no history
    #[serde(rename = "method2")]
    Stateless,
}

impl TranslationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contextual => "method1",
            Self::Stateless => "method2",
        }
    }
}

impl fmt::Display for TranslationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorModel {
    /// Regular speech bubbles only
    #[serde(rename = "model1")]
    Model1,
    /// Bubbles, sfx and irregular text
    #[serde(rename = "model2")]
    Model2,
}

impl DetectorModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model1 => "model1",
            Self::Model2 => "model2",
        }
    }
}

impl fmt::Display for DetectorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested region in pixel coordinates, as sent by the client.
///
/// Values may be fractional (they come from a browser canvas) and may lie
/// outside the image; call [`Region::clamp`] before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Region after clamping to image bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClampedRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Clamp origin into the image, then shrink the extent so the
    /// rectangle never leaves it. Negative extents collapse to zero.
    pub fn clamp(&self, image_width: u32, image_height: u32) -> ClampedRegion {
        let x = self.x.round().clamp(0.0, image_width as f64) as u32;
        let y = self.y.round().clamp(0.0, image_height as f64) as u32;
        let width = self.width.round().clamp(0.0, (image_width - x) as f64) as u32;
        let height = self.height.round().clamp(0.0, (image_height - y) as f64) as u32;

        ClampedRegion {
            x,
            y,
            width,
            height,
        }
    }
}

impl ClampedRegion {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<ClampedRegion> for Region {
    fn from(r: ClampedRegion) -> Self {
        Region {
            x: r.x as f64,
            y: r.y as f64,
            width: r.width as f64,
            height: r.height as f64,
        }
    }
}

/// Pixel bounding box returned to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Raw detector output for one box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One conversation turn sent to the chat backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// POST /process_region body
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRegionRequest {
    pub image: String,
    pub region: Region,
    pub method: TranslationMethod,
}

/// Result of a region run through OCR and translation
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRegionResponse {
    pub message: String,
    pub processed_image: String,
    pub text: String,
    pub translated_text: String,
}

/// POST /scan body
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub image: String,
    pub method: DetectorModel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResponse {
    pub boxes: Vec<BoundingBox>,
}

/// Image listing returned after an upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Counts from a directory sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_in_bounds(r: ClampedRegion, w: u32, h: u32) {
        assert!(r.x <= w && r.y <= h);
        assert!(r.x + r.width <= w, "{r:?} exceeds width {w}");
        assert!(r.y + r.height <= h, "{r:?} exceeds height {h}");
    }

    #[test]
    fn test_clamp_inside_region_unchanged() {
        let region = Region { x: 10.0, y: 20.0, width: 30.0, height: 40.0 };
        let clamped = region.clamp(100, 100);
        assert_eq!(clamped, ClampedRegion { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_clamp_bounds_and_idempotence() {
        let cases = [
            (-50.0, -10.0, 500.0, 500.0),
            (90.0, 90.0, 50.0, 50.0),
            (150.0, 300.0, 10.0, 10.0),
            (10.0, 10.0, -5.0, -5.0),
            (0.4, 99.6, 1e9, 1e9),
            (100.0, 80.0, 0.0, 0.0),
        ];
        for (w, h) in [(100u32, 80u32), (1, 1), (0, 0), (4000, 6000)] {
            for &(x, y, width, height) in &cases {
                let once = Region { x, y, width, height }.clamp(w, h);
                assert_in_bounds(once, w, h);
                let twice = Region::from(once).clamp(w, h);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn test_clamp_origin_at_edge_yields_empty() {
        let clamped = Region { x: 500.0, y: 10.0, width: 20.0, height: 20.0 }.clamp(100, 100);
        assert_eq!(clamped.x, 100);
        assert_eq!(clamped.width, 0);
        assert!(clamped.is_empty());
    }

    #[test]
    fn test_selectors_parse_from_wire_names() {
        let m: TranslationMethod = serde_json::from_str("\"method1\"").unwrap();
        assert_eq!(m, TranslationMethod::Contextual);
        let m: TranslationMethod = serde_json::from_str("\"method2\"").unwrap();
        assert_eq!(m, TranslationMethod::Stateless);
        assert!(serde_json::from_str::<TranslationMethod>("\"deepl\"").is_err());

        let d: DetectorModel = serde_json::from_str("\"model2\"").unwrap();
        assert_eq!(d, DetectorModel::Model2);
        assert!(serde_json::from_str::<DetectorModel>("\"model3\"").is_err());
    }

    #[test]
    fn test_upload_kind_from_filename() {
        assert_eq!(UploadKind::from_filename("ch1.ZIP"), Some(UploadKind::Archive));
        assert_eq!(
            UploadKind::from_filename("p.JPeG"),
            Some(UploadKind::Image(ImageFormat::Jpeg))
        );
        assert_eq!(UploadKind::from_filename("notes.txt"), None);
        assert_eq!(UploadKind::from_filename("noext"), None);
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
