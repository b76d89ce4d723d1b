//! Quick OCR check: crop a region of a page and print what the recognizer reads
//! Run with: cargo run --release --bin test_ocr -- <image_path> [x y width height]

use anyhow::{bail, Result};
use image::GenericImageView;
use manga_reader::core::Region;
use manga_reader::services::ocr::OcrService;
use std::path::Path;
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("manga_reader::services::ocr=debug,test_ocr=info")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let sample_path = args.first().cloned().unwrap_or_else(|| "test_sample.png".to_string());

    if !Path::new(&sample_path).exists() {
        bail!("Image not found: {}", sample_path);
    }

    info!("Loading image: {}", sample_path);
    let page = image::open(&sample_path)?;
    let (width, height) = page.dimensions();
    info!("Image dimensions: {}x{}", width, height);

    let region = match args.get(1..).unwrap_or_default() {
        [x, y, w, h] => Region {
            x: x.parse()?,
            y: y.parse()?,
            width: w.parse()?,
            height: h.parse()?,
        },
        [] => Region {
            x: 0.0,
            y: 0.0,
            width: width as f64,
            height: height as f64,
        },
        _ => bail!("Expected either no region or all of: x y width height"),
    };
    let clamped = region.clamp(width, height);
    info!("Region {:?} -> {:?}", region, clamped);
    if clamped.is_empty() {
        bail!("Region is empty after clamping to the image");
    }
    let crop = page.crop_imm(clamped.x, clamped.y, clamped.width, clamped.height);

    let models_dir = Path::new("models");
    info!("Initializing OCR service from: {}", models_dir.display());
    let ocr_service = OcrService::new(models_dir, num_cpus::get())?;

    let (text, confidence) = ocr_service.recognize_with_confidence(&crop)?;

    println!("\n=== Results ===");
    println!("Confidence: {:.2}", confidence);
    println!("Text:");
    if text.is_empty() {
        println!("  (empty)");
    } else {
        for (i, line) in text.lines().enumerate() {
            println!("  {}. {}", i + 1, line);
        }
    }

    Ok(())
}
