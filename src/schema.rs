//! Marksheet result types shared by the pipeline and the HTTP layer.

use serde::{Deserialize, Serialize};

/// One subject row recovered from the marksheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub subject: String,
    pub marks: u32,
}

impl SubjectRecord {
    pub fn new(subject: impl Into<String>, marks: u32) -> Self {
        Self {
            subject: subject.into(),
            marks,
        }
    }
}

/// Scored marksheet.
///
/// Only built through [`crate::scorer::Scorer::score`], so totals and
/// percentage always agree with `subjects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarksheetResult {
    pub total_subjects: usize,
    pub total_marks: u32,
    pub percentage: f64,
    pub grade: String,
    pub subjects: Vec<SubjectRecord>,
}

/// Outcome of one pipeline call. Always produced, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    /// `None` on failure; partial results are never returned.
    pub results: Option<MarksheetResult>,
    pub message: String,
}

impl ResponseEnvelope {
    pub fn ok(results: MarksheetResult) -> Self {
        Self {
            success: true,
            results: Some(results),
            message: "Processed successfully".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_envelope_serializes_null_results() {
        let envelope = ResponseEnvelope::failed("Error: nothing");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["success"], false);
        assert!(json["results"].is_null());
        assert_eq!(json["message"], "Error: nothing");
    }
}
