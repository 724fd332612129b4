//! Line-based subject/marks extraction from OCR text.
//!
//! Pure functions, no I/O. Lines are trimmed, administrative rows
//! (totals, percentages, grades) are dropped, then the configured matcher
//! passes run in order. The first pass that recovers anything wins.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{CorrectionConfig, ExtractionConfig, MatcherConfig};
use crate::error::ExtractError;
use crate::schema::SubjectRecord;

/// A compiled matcher pass. Yields at most one record per line.
struct LineMatcher {
    name: String,
    regex: Regex,
}

impl LineMatcher {
    fn compile(config: &MatcherConfig) -> Option<Self> {
        let regex = match Regex::new(&config.pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(
                    "Skipping invalid matcher '{}' ({}): {}",
                    config.name, config.pattern, e
                );
                return None;
            }
        };

        let groups: Vec<&str> = regex.capture_names().flatten().collect();
        if !groups.contains(&"subject") || !groups.contains(&"marks") {
            warn!(
                "Skipping matcher '{}': pattern needs named groups 'subject' and 'marks'",
                config.name
            );
            return None;
        }

        Some(Self {
            name: config.name.clone(),
            regex,
        })
    }

    fn match_line(&self, line: &str) -> Option<(String, u32)> {
        let caps = self.regex.captures(line)?;
        let subject = title_case(caps.name("subject")?.as_str().trim());
        if subject.is_empty() {
            return None;
        }
        let marks = caps.name("marks")?.as_str().parse().ok()?;
        Some((subject, marks))
    }
}

/// Noise filter, ordered matchers and low-mark correction for one profile.
pub struct LineParser {
    noise_keywords: Vec<String>,
    matchers: Vec<LineMatcher>,
    correction: CorrectionConfig,
}

impl LineParser {
    /// Compile a profile's matchers. Invalid ones are skipped with a warning.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        let matchers: Vec<LineMatcher> =
            config.matchers.iter().filter_map(LineMatcher::compile).collect();
        debug!(
            "Profile '{}': compiled {} line matchers",
            config.name,
            matchers.len()
        );

        Self {
            noise_keywords: config
                .noise_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            matchers,
            correction: config.correction.clone(),
        }
    }

    /// Returns true if no matcher survived compilation.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Extract subject records from raw recognizer output.
    pub fn parse(&self, text: &str) -> Result<Vec<SubjectRecord>, ExtractError> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter(|l| !self.is_noise(l))
            .collect();

        for matcher in &self.matchers {
            let records: Vec<SubjectRecord> = lines
                .iter()
                .filter_map(|line| {
                    let (subject, raw) = matcher.match_line(line)?;
                    let marks = self.correct(raw);
                    debug!(
                        "[{}] {:?} -> {} = {} (read {})",
                        matcher.name, line, subject, marks, raw
                    );
                    Some(SubjectRecord::new(subject, marks))
                })
                .collect();

            if !records.is_empty() {
                debug!("Matcher '{}' recovered {} subjects", matcher.name, records.len());
                return Ok(records);
            }
            debug!("Matcher '{}' matched nothing", matcher.name);
        }

        Err(ExtractError::NoSubjectsDetected)
    }

    fn is_noise(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.noise_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Undo the dropped-leading-digit misread, e.g. "92" read as "32".
    fn correct(&self, marks: u32) -> u32 {
        let c = &self.correction;
        if !c.enabled || marks >= c.threshold || (c.exempt_zero && marks == 0) {
            return marks;
        }
        marks + c.offset
    }
}

/// Capitalize the first letter of every word and lowercase the rest.
/// A word starts at any letter not preceded by another letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
