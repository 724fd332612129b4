//! Pluggable text recognition.
//!
//! Defines the [`TextRecognizer`] trait so OCR backends can be swapped
//! without touching the line parser.

pub mod tesseract;

use image::GrayImage;

use crate::error::ExtractError;

/// Image in, unstructured multi-line text out.
///
/// Implementations may merge columns, drop characters or emit stray
/// whitespace; the line parser is built to tolerate that.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, image: &GrayImage) -> Result<String, ExtractError>;
}
