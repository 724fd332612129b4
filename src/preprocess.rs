//! Image normalization ahead of OCR.
//!
//! Grayscale, 3x3 median to knock out speckle, then a global Otsu threshold
//! so the recognizer sees two-level ink/paper strokes. No deskew or crop.

use std::path::Path;

use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::filter::median_filter;
use tracing::debug;

use crate::error::ExtractError;

/// Median filter radius; 1 gives a 3x3 kernel.
const MEDIAN_RADIUS: u32 = 1;

/// Decode the image at `path` and binarize it.
pub fn normalize_file(path: &Path) -> Result<GrayImage, ExtractError> {
    let img = image::open(path).map_err(|e| ExtractError::unreadable(path, e))?;
    debug!(
        "Decoded {:?}: {}x{} {:?}",
        path,
        img.width(),
        img.height(),
        img.color()
    );
    Ok(normalize(&img))
}

/// Binarize an already decoded image.
pub fn normalize(img: &DynamicImage) -> GrayImage {
    let gray = img.to_luma8();
    let denoised = median_filter(&gray, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let level = otsu_level(&denoised);
    debug!("Otsu threshold level: {}", level);
    threshold(&denoised, level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    /// Light paper with a dark horizontal bar of "ink".
    fn sample_page() -> RgbImage {
        RgbImage::from_fn(40, 30, |_, y| {
            if (10..20).contains(&y) {
                Rgb([30, 30, 40])
            } else {
                Rgb([220, 215, 210])
            }
        })
    }

    #[test]
    fn test_output_is_two_level() {
        let out = normalize(&DynamicImage::ImageRgb8(sample_page()));
        assert_eq!(out.dimensions(), (40, 30));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(20, 15), &Luma([0]));
        assert_eq!(out.get_pixel(20, 2), &Luma([255]));
    }

    #[test]
    fn test_speckle_removed() {
        let mut page = sample_page();
        // Isolated dark dot on the paper.
        page.put_pixel(5, 3, Rgb([0, 0, 0]));
        let out = normalize(&DynamicImage::ImageRgb8(page));
        assert_eq!(out.get_pixel(5, 3), &Luma([255]));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let err = normalize_file(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UnreadableImage { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = normalize_file(Path::new("/no/such/marksheet.jpg")).unwrap_err();
        assert!(matches!(err, ExtractError::UnreadableImage { .. }));
    }

    #[test]
    fn test_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        sample_page().save(&path).unwrap();

        let out = normalize_file(&path).unwrap();
        assert_eq!(out.dimensions(), (40, 30));
    }
}
