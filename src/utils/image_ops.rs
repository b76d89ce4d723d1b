use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::core::types::ClampedRegion;

/// Asynchronously load an image from bytes using spawn_blocking.
///
/// Image decoding is CPU-intensive, especially for full manga pages.
pub async fn load_image_from_memory_async(bytes: Vec<u8>) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&bytes).context("Failed to load image from memory")
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Crop a clamped region and encode it as PNG in one blocking task.
///
/// Returns the cropped image (for OCR) together with its PNG bytes (for the
/// artifact store). PNG cannot hold a zero-sized image, so an empty region
/// is stored as a single transparent pixel while OCR still sees the empty crop.
pub async fn crop_region_async(
    img: std::sync::Arc<DynamicImage>,
    region: ClampedRegion,
) -> Result<(DynamicImage, Vec<u8>)> {
    tokio::task::spawn_blocking(move || {
        let cropped = img.crop_imm(region.x, region.y, region.width, region.height);
        let png_bytes = if region.is_empty() {
            encode_png(&DynamicImage::new_rgba8(1, 1))?
        } else {
            encode_png(&cropped)?
        };
        Ok((cropped, png_bytes))
    })
    .await
    .context("Failed to spawn blocking task for crop and encode")?
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .context("Failed to encode image as PNG")?;
    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};
    use std::sync::Arc;

    fn page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        }))
    }

    #[tokio::test]
    async fn test_crop_matches_region() {
        let region = ClampedRegion {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        let (cropped, png) = crop_region_async(Arc::new(page(100, 100)), region)
            .await
            .unwrap();
        assert_eq!(cropped.dimensions(), (30, 40));
        assert_eq!(cropped.get_pixel(0, 0), Rgba([10, 20, 0, 255]));

        let decoded = load_image_from_memory_async(png).await.unwrap();
        assert_eq!(decoded.dimensions(), (30, 40));
    }

    #[tokio::test]
    async fn test_empty_region_still_stores_artifact() {
        let region = ClampedRegion {
            x: 100,
            y: 5,
            width: 0,
            height: 10,
        };
        let (cropped, png) = crop_region_async(Arc::new(page(100, 100)), region)
            .await
            .unwrap();
        assert_eq!(cropped.width(), 0);
        let decoded = load_image_from_memory_async(png).await.unwrap();
        assert_eq!(decoded.dimensions(), (1, 1));
    }

    #[tokio::test]
    async fn test_decode_garbage_fails() {
        assert!(load_image_from_memory_async(b"not an image".to_vec()).await.is_err());
    }
}
