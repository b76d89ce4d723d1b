// OCR Service Module - Local CJK OCR for Japanese text recognition
// CPU-only ONNX inference, CTC-decoded

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::services::onnx_builder::build_cpu_session;

/// OCR model input dimensions
const TARGET_HEIGHT: u32 = 60;
const MIN_WIDTH: u32 = 10;

/// Text recognition over a cropped region
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

/// OCR Service for local Japanese text recognition
pub struct OcrService {
    session: Mutex<Session>,
    vocab: HashMap<usize, String>,
    blank_index: usize,
}

impl OcrService {
    /// Load `ocr/ocr.onnx` and `ocr/cjk_vocab.txt` from the models directory
    pub fn new(models_dir: &Path, intra_threads: usize) -> Result<Self> {
        let model_path = models_dir.join("ocr").join("ocr.onnx");
        let vocab_path = models_dir.join("ocr").join("cjk_vocab.txt");

        if !vocab_path.exists() {
            anyhow::bail!("OCR vocabulary not found at: {}", vocab_path.display());
        }

        let session = build_cpu_session(&model_path, intra_threads)?;
        let content =
            std::fs::read_to_string(&vocab_path).context("Failed to read vocabulary file")?;
        let vocab = parse_vocabulary(&content);
        let blank_index = vocab.len().saturating_sub(1);

        info!(
            "OCR service initialized: vocab_size={}, blank_index={}",
            vocab.len(),
            blank_index
        );

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            blank_index,
        })
    }

    /// Whether the model files exist under `models_dir`
    pub fn is_available(models_dir: &Path) -> bool {
        models_dir.join("ocr").join("ocr.onnx").exists()
            && models_dir.join("ocr").join("cjk_vocab.txt").exists()
    }

    /// Resize to the model height keeping aspect ratio, normalize to [0, 1],
    /// lay out as [1, 3, H, W]. Also returns the LSTM sequence length.
    fn preprocess_image(&self, image: &DynamicImage) -> (Array4<f32>, i32) {
        let (w, h) = image.dimensions();

        let scale = TARGET_HEIGHT as f32 / h as f32;
        let new_w = ((w as f32 * scale) as u32).max(MIN_WIDTH);

        let rgb = image
            .resize_exact(new_w, TARGET_HEIGHT, image::imageops::FilterType::Lanczos3)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, TARGET_HEIGHT as usize, new_w as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }

        // seq_length = width / 4 (LSTM stride)
        (tensor, (new_w / 4) as i32)
    }

    /// Run OCR on a single image region, returning text and mean confidence
    pub fn recognize_with_confidence(&self, image: &DynamicImage) -> Result<(String, f32)> {
        let (tensor, seq_length) = self.preprocess_image(image);

        let data_value = Value::from_array(tensor)?;
        let seq_lengths_value = Value::from_array(([1usize], vec![seq_length]))?;

        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                "data" => data_value,
                "seq_lengths" => seq_lengths_value
            ])?;

            let (shape, logits_data) = if let Some(output) = outputs.get("output") {
                output.try_extract_tensor::<f32>()?
            } else {
                let first_key = outputs.keys().next().context("No outputs from OCR model")?;
                outputs[first_key].try_extract_tensor::<f32>()?
            };

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, logits_data.to_vec())
        };

        let (seq_len, vocab_size) = logits_layout(&dims)?;
        let (text, confidence) = ctc_decode(&logits, seq_len, vocab_size, self.blank_index, &self.vocab);

        debug!("OCR result: '{}' (confidence: {:.2})", text, confidence);
        Ok((text, confidence))
    }
}

impl TextRecognizer for OcrService {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        if image.width() == 0 || image.height() == 0 {
            debug!("OCR skipped on empty region");
            return Ok(String::new());
        }
        self.recognize_with_confidence(image).map(|(text, _)| text)
    }
}

/// Vocabulary file: one `index\tchar` per line. ASCII printable indices are
/// prefilled; `<space>` maps to " " and `<blank>` is skipped.
fn parse_vocabulary(content: &str) -> HashMap<usize, String> {
    let mut vocab = HashMap::new();

    vocab.insert(0, " ".to_string());
    for i in 32..97usize {
        vocab.insert(i, (i as u8 as char).to_string());
    }

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((idx_str, char_str)) = line.split_once('\t') else {
            continue;
        };
        let Ok(idx) = idx_str.parse::<usize>() else {
            continue;
        };
        match char_str {
            "<blank>" => continue,
            "<space>" => vocab.insert(idx, " ".to_string()),
            other => vocab.insert(idx, other.to_string()),
        };
    }

    debug!("Loaded {} vocabulary entries", vocab.len());
    vocab
}

/// (sequence length, vocab size) from a [S,1,V], [1,S,V] or [S,V] logits shape
fn logits_layout(dims: &[usize]) -> Result<(usize, usize)> {
    match dims {
        [s, 1, v] => Ok((*s, *v)),
        [1, s, v] => Ok((*s, *v)),
        [s, v] => Ok((*s, *v)),
        _ => anyhow::bail!("Unexpected logits shape: {:?}", dims),
    }
}

/// Greedy CTC decode: best class per step, collapse repeats, drop blanks
fn ctc_decode(
    logits: &[f32],
    seq_len: usize,
    vocab_size: usize,
    blank_index: usize,
    vocab: &HashMap<usize, String>,
) -> (String, f32) {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev_idx: Option<usize> = None;

    for step in logits.chunks(vocab_size.max(1)).take(seq_len) {
        let (best_idx, best_val) = step
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        if best_idx != blank_index && Some(best_idx) != prev_idx {
            text.push_str(vocab.get(&best_idx).map(String::as_str).unwrap_or("?"));
            // log prob -> confidence
            confidences.push(best_val.exp().min(1.0));
        }
        prev_idx = Some(best_idx);
    }

    let avg_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };

    (text, avg_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocab_parsing() {
        let vocab = parse_vocabulary("0\t<space>\n33\t!\n100\t<blank>\n12345\t漢\nbad line\n");
        assert_eq!(vocab.get(&0).map(String::as_str), Some(" "));
        assert_eq!(vocab.get(&33).map(String::as_str), Some("!"));
        assert_eq!(vocab.get(&12345).map(String::as_str), Some("漢"));
        assert!(!vocab.contains_key(&100));
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        let mut vocab = HashMap::new();
        vocab.insert(0, "あ".to_string());
        vocab.insert(1, "い".to_string());
        let blank = 2;
        // steps: あ あ blank あ い
        let logits = [
            0.9, 0.0, 0.1, //
            0.9, 0.0, 0.1, //
            0.0, 0.1, 0.9, //
            0.9, 0.0, 0.1, //
            0.0, 0.9, 0.1,
        ];
        let (text, _) = ctc_decode(&logits, 5, 3, blank, &vocab);
        assert_eq!(text, "ああい");
    }

    #[test]
    fn test_logits_layout() {
        assert_eq!(logits_layout(&[40, 1, 7000]).unwrap(), (40, 7000));
        assert_eq!(logits_layout(&[1, 40, 7000]).unwrap(), (40, 7000));
        assert_eq!(logits_layout(&[40, 7000]).unwrap(), (40, 7000));
        assert!(logits_layout(&[1, 2, 3, 4]).is_err());
    }
}
