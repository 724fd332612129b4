//! Marksheet extraction pipeline: normalize, recognize, parse, score.
//!
//! [`MarksheetExtractor::extract_marks`] is the boundary. Whatever goes wrong
//! inside, the caller gets a well-formed [`ResponseEnvelope`].

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::ocr::TextRecognizer;
use crate::parser::LineParser;
use crate::preprocess;
use crate::schema::{MarksheetResult, ResponseEnvelope, SubjectRecord};
use crate::scorer::Scorer;

/// One profile's pipeline. Holds no per-call state, so it can be shared
/// across concurrent requests.
pub struct MarksheetExtractor {
    profile: String,
    recognizer: Arc<dyn TextRecognizer>,
    parser: LineParser,
    scorer: Scorer,
}

impl MarksheetExtractor {
    pub fn new(config: &ExtractionConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let parser = LineParser::from_config(config);
        if parser.is_empty() {
            warn!("Profile '{}' has no usable matchers; every scan will fail", config.name);
        }

        Self {
            profile: config.name.clone(),
            recognizer,
            parser,
            scorer: Scorer::from_config(&config.scoring),
        }
    }

    /// Run the whole pipeline on one image file. Never fails.
    pub fn extract_marks(&self, image_path: &Path) -> ResponseEnvelope {
        info!(
            "Extracting marks from {:?} (profile={}, recognizer={})",
            image_path,
            self.profile,
            self.recognizer.name()
        );

        match self.try_extract(image_path) {
            Ok(result) => {
                info!(
                    "Extraction complete: {} subjects, {} marks, {}% ({})",
                    result.total_subjects, result.total_marks, result.percentage, result.grade
                );
                ResponseEnvelope::ok(result)
            }
            Err(e) => {
                error!("Extraction failed for {:?}: {}", image_path, e);
                ResponseEnvelope::failed(format!("Error: {}", e))
            }
        }
    }

    fn try_extract(&self, image_path: &Path) -> Result<MarksheetResult, ExtractError> {
        let image = preprocess::normalize_file(image_path)?;
        let text = self.recognizer.recognize(&image)?;
        debug!("OCR text:\n{}", text);
        self.score_text(&text)
    }

    /// Parse and score recognizer output directly.
    pub fn score_text(&self, text: &str) -> Result<MarksheetResult, ExtractError> {
        let subjects = self.parser.parse(text)?;
        Ok(self.scorer.score(subjects))
    }

    /// Score hand-entered subjects, bypassing OCR and parsing.
    pub fn score_manual(&self, subjects: Vec<SubjectRecord>) -> ResponseEnvelope {
        if subjects.is_empty() {
            return ResponseEnvelope::failed("Error: no subjects provided");
        }
        if let Some(bad) = subjects.iter().find(|s| s.marks > 999) {
            return ResponseEnvelope::failed(format!(
                "Error: marks for {} out of range: {}",
                bad.subject, bad.marks
            ));
        }
        ResponseEnvelope::ok(self.scorer.score(subjects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_default_config;
    use crate::ocr::testing::{Broken, FixedText};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;

    fn extractor(recognizer: impl TextRecognizer + 'static) -> MarksheetExtractor {
        MarksheetExtractor::new(&create_default_config(), Arc::new(recognizer))
    }

    /// Writes a small valid PNG; content is irrelevant with a fixed recognizer.
    fn scan(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("marksheet.png");
        RgbImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgb([20, 20, 20])
            } else {
                Rgb([240, 240, 240])
            }
        })
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn test_two_column_marksheet() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(FixedText::lines(&[
            "Math 100 92",
            "Science 100 45",
            "Total 200 137",
        ]));

        let envelope = ex.extract_marks(&scan(&dir));
        assert!(envelope.success);
        assert_eq!(envelope.message, "Processed successfully");

        let results = envelope.results.unwrap();
        assert_eq!(
            results.subjects,
            vec![
                SubjectRecord::new("Math", 92),
                SubjectRecord::new("Science", 105),
            ]
        );
        assert_eq!(results.total_marks, 197);
        assert_eq!(results.total_subjects, 2);
        assert_eq!(results.percentage, 98.5);
        assert_eq!(results.grade, "A+");
    }

    #[test]
    fn test_only_noise_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(FixedText::lines(&["Total 500 410", "Percentage 82.0"]));

        let envelope = ex.extract_marks(&scan(&dir));
        assert!(!envelope.success);
        assert!(envelope.results.is_none());
        assert!(envelope.message.contains("No valid subjects"));
    }

    #[test]
    fn test_single_column_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(FixedText::lines(&["English 88", "History 30"]));

        let results = ex.extract_marks(&scan(&dir)).results.unwrap();
        assert_eq!(
            results.subjects,
            vec![
                SubjectRecord::new("English", 88),
                SubjectRecord::new("History", 90),
            ]
        );
        assert_eq!(results.total_marks, 178);
        assert_eq!(results.percentage, 89.0);
        assert_eq!(results.grade, "A");
    }

    #[test]
    fn test_repeat_calls_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = scan(&dir);
        let ex = extractor(FixedText::lines(&["Math 100 92", "Art 100 67"]));

        assert_eq!(ex.extract_marks(&path), ex.extract_marks(&path));
    }

    #[test]
    fn test_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.jpg");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();
        let ex = extractor(FixedText::lines(&["Math 100 92"]));

        let envelope = ex.extract_marks(&path);
        assert!(!envelope.success);
        assert!(envelope.results.is_none());
        assert!(envelope.message.starts_with("Error: Unable to read image file"));
    }

    #[test]
    fn test_recognizer_fault() {
        let dir = tempfile::tempdir().unwrap();
        let envelope = extractor(Broken).extract_marks(&scan(&dir));

        assert!(!envelope.success);
        assert!(envelope.results.is_none());
        assert!(envelope.message.contains("engine crashed"));
    }

    #[test]
    fn test_totals_match_subjects() {
        let ex = extractor(FixedText(String::new()));
        let text = "Hindi 100 77\nEnglish 100 18\nMaths 100 00\nScience 100 99\nSst 100 64";

        let results = ex.score_text(text).unwrap();
        let sum: u32 = results.subjects.iter().map(|s| s.marks).sum();
        assert_eq!(results.total_marks, sum);
        assert_eq!(results.total_subjects, results.subjects.len());
        assert_eq!(results.subjects[1].marks, 78);
        assert_eq!(results.subjects[2].marks, 0);
        // 318 / 500
        assert_eq!(results.percentage, 63.6);
        assert_eq!(results.grade, "C");
    }

    #[test]
    fn test_manual_scoring() {
        let ex = extractor(FixedText(String::new()));

        let envelope = ex.score_manual(vec![
            SubjectRecord::new("English", 45),
            SubjectRecord::new("Maths", 75),
        ]);
        let results = envelope.results.unwrap();
        // No OCR correction on typed-in marks.
        assert_eq!(results.total_marks, 120);
        assert_eq!(results.percentage, 60.0);
        assert_eq!(results.grade, "C");

        assert!(!ex.score_manual(Vec::new()).success);
        assert!(!ex.score_manual(vec![SubjectRecord::new("Maths", 1000)]).success);
    }
}
