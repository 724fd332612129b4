//! Totals, percentage and letter grade.

use crate::config::{GradeBand, ScoringConfig};
use crate::schema::{MarksheetResult, SubjectRecord};

pub struct Scorer {
    max_marks_per_subject: u32,
    /// Sorted by `min_percentage`, highest first.
    ladder: Vec<GradeBand>,
    fallback_grade: String,
}

impl Scorer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        let mut ladder = config.grade_ladder.clone();
        ladder.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));

        Self {
            max_marks_per_subject: config.max_marks_per_subject,
            ladder,
            fallback_grade: config.fallback_grade.clone(),
        }
    }

    /// Score a non-empty subject list.
    ///
    /// Every subject is assumed to be out of `max_marks_per_subject`; a paper
    /// graded on a different scale silently skews the percentage.
    pub fn score(&self, subjects: Vec<SubjectRecord>) -> MarksheetResult {
        let total_subjects = subjects.len();
        let total_marks: u32 = subjects.iter().map(|s| s.marks).sum();
        let percentage = self.percentage(total_marks, total_subjects);

        MarksheetResult {
            total_subjects,
            total_marks,
            percentage,
            grade: self.grade(percentage).to_string(),
            subjects,
        }
    }

    fn percentage(&self, total_marks: u32, total_subjects: usize) -> f64 {
        let max_total = total_subjects as f64 * self.max_marks_per_subject as f64;
        if max_total == 0.0 {
            return 0.0;
        }
        round2(total_marks as f64 / max_total * 100.0)
    }

    /// First band whose floor the percentage reaches.
    pub fn grade(&self, percentage: f64) -> &str {
        self.ladder
            .iter()
            .find(|band| percentage >= band.min_percentage)
            .map(|band| band.grade.as_str())
            .unwrap_or(&self.fallback_grade)
    }
}

/// Two decimal places, exact halves to even (70.125 -> 70.12).
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
