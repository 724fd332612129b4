//! Error taxonomy for the marksheet pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised anywhere between image decode and scoring.
///
/// None of these escape [`crate::pipeline::MarksheetExtractor::extract_marks`];
/// they are folded into a failed envelope there.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The path does not decode to a raster image.
    #[error("Unable to read image file {path:?}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    /// The OCR backend failed to run or returned garbage bytes.
    #[error("Text recognition failed: {0}")]
    Recognizer(String),

    /// Neither matcher pass produced a subject line.
    #[error("No valid subjects or marks detected from OCR text.")]
    NoSubjectsDetected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnreadableImage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
