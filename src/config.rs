//! Service and extraction configuration.
//!
//! Process-level settings come from the environment (`.env` is honoured).
//! Extraction profiles are JSON files in the `configs/` directory; when none
//! are present the built-in default profile is used.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_PROFILE: &str = "default";

/// Process settings read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub config_dir: PathBuf,
    pub tesseract: TesseractConfig,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// How to invoke the tesseract binary.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    pub command: PathBuf,
    pub language: String,
    pub psm: u8,
    pub oem: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            psm: 3,
            oem: 3,
        }
    }
}

impl AppConfig {
    /// Read settings from the environment, falling back to local-dev defaults.
    pub fn from_env() -> Result<Self> {
        let tesseract = TesseractConfig {
            command: env::var("TESSERACT_CMD")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("tesseract")),
            language: env::var("TESSERACT_LANG").unwrap_or_else(|_| "eng".to_string()),
            psm: parse_var("TESSERACT_PSM", 3)?,
            oem: parse_var("TESSERACT_OEM", 3)?,
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/uploads")),
            config_dir: env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("configs")),
            tesseract,
            cors_origins,
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// One extraction profile: noise filter, matchers, correction and scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lines whose lowercased text contains any of these are never parsed.
    #[serde(default = "default_noise_keywords")]
    pub noise_keywords: Vec<String>,
    /// Matcher passes, tried in order until one yields at least one record.
    #[serde(default = "default_matchers")]
    pub matchers: Vec<MatcherConfig>,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Subject names offered for manual entry.
    #[serde(default)]
    pub known_subjects: Vec<String>,
}

/// A line pattern. Must expose named groups `subject` and `marks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub name: String,
    pub pattern: String,
}

/// Compensates for OCR dropping the leading digit of a high score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub enabled: bool,
    /// Values strictly below this are bumped.
    pub threshold: u32,
    pub offset: u32,
    /// Leave an exact 0 untouched.
    pub exempt_zero: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 50,
            offset: 60,
            exempt_zero: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_marks_per_subject: u32,
    pub grade_ladder: Vec<GradeBand>,
    /// Grade when no band matches.
    pub fallback_grade: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_marks_per_subject: 100,
            grade_ladder: vec![
                GradeBand::new(90.0, "A+"),
                GradeBand::new(80.0, "A"),
                GradeBand::new(70.0, "B"),
                GradeBand::new(60.0, "C"),
            ],
            fallback_grade: "D".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeBand {
    pub min_percentage: f64,
    pub grade: String,
}

impl GradeBand {
    pub fn new(min_percentage: f64, grade: &str) -> Self {
        Self {
            min_percentage,
            grade: grade.to_string(),
        }
    }
}

fn default_noise_keywords() -> Vec<String> {
    ["total", "max", "percentage", "grade", "marks obtained"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_matchers() -> Vec<MatcherConfig> {
    vec![
        // Subject, max marks, obtained marks.
        MatcherConfig {
            name: "primary".to_string(),
            pattern: r"(?P<subject>[A-Za-z &]+)\s+(?P<max>\d{2,3})\s+(?P<marks>\d{2,3})$"
                .to_string(),
        },
        // Single-column layout: subject, obtained marks.
        MatcherConfig {
            name: "fallback".to_string(),
            pattern: r"(?P<subject>[A-Za-z &]+)\s+(?P<marks>\d{2,3})$".to_string(),
        },
    ]
}

/// In-memory store for all loaded extraction profiles.
#[derive(Debug)]
pub struct ConfigStore {
    configs: HashMap<String, ExtractionConfig>,
}

impl ConfigStore {
    /// Load all `*.json` profiles from the directory.
    ///
    /// The built-in default is always present unless a file named `default`
    /// overrides it. A missing directory is not an error.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut configs = HashMap::new();
        configs.insert(DEFAULT_PROFILE.to_string(), create_default_config());

        if !dir.exists() {
            info!("Config directory {:?} not found, using built-in profile", dir);
            return Ok(Self { configs });
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {:?}", path))?;

                let config: ExtractionConfig = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {:?}", path))?;

                info!("Loaded config: {} from {:?}", config.name, path);
                configs.insert(config.name.clone(), config);
            }
        }

        Ok(Self { configs })
    }

    /// Get a config by name (returns clone).
    pub fn get(&self, name: &str) -> Option<ExtractionConfig> {
        self.configs.get(name).cloned()
    }

    /// List all available config names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn all(&self) -> Vec<ExtractionConfig> {
        self.configs.values().cloned().collect()
    }
}

/// The stock profile for a two-column (max, obtained) marksheet graded out of 100.
pub fn create_default_config() -> ExtractionConfig {
    ExtractionConfig {
        name: DEFAULT_PROFILE.to_string(),
        description: "Subject / max marks / obtained marks table, 100 marks per subject"
            .to_string(),
        noise_keywords: default_noise_keywords(),
        matchers: default_matchers(),
        correction: CorrectionConfig::default(),
        scoring: ScoringConfig::default(),
        known_subjects: [
            "English",
            "Mathematics",
            "Science",
            "Social Science",
            "Hindi",
            "Computer Science",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_profile_uses_defaults() {
        let json = r#"{"name": "strict", "correction": {"enabled": false}}"#;
        let config: ExtractionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.name, "strict");
        assert!(!config.correction.enabled);
        assert_eq!(config.correction.threshold, 50);
        assert_eq!(config.matchers.len(), 2);
        assert_eq!(config.matchers[0].name, "primary");
        assert_eq!(config.scoring.max_marks_per_subject, 100);
        assert_eq!(config.scoring.fallback_grade, "D");
        assert!(config.noise_keywords.contains(&"marks obtained".to_string()));
    }

    #[test]
    fn test_missing_dir_yields_default() {
        let store = ConfigStore::load_from_dir(Path::new("/nonexistent/marksheet/configs")).unwrap();
        assert_eq!(store.list(), vec!["default".to_string()]);
        assert!(store.get(DEFAULT_PROFILE).is_some());
    }

    #[test]
    fn test_load_profiles_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cbse.json"),
            r#"{"name": "cbse", "scoring": {"max_marks_per_subject": 80}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = ConfigStore::load_from_dir(dir.path()).unwrap();
        assert_eq!(store.list(), vec!["cbse".to_string(), "default".to_string()]);
        assert_eq!(store.get("cbse").unwrap().scoring.max_marks_per_subject, 80);
    }

    #[test]
    fn test_shipped_profiles_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
        let store = ConfigStore::load_from_dir(&dir).unwrap();

        assert_eq!(
            store.list(),
            vec!["default".to_string(), "single_column".to_string()]
        );
        let single = store.get("single_column").unwrap();
        assert_eq!(single.matchers.len(), 1);
        assert_eq!(single.scoring.grade_ladder.len(), 4);
    }

    #[test]
    fn test_invalid_profile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        assert!(ConfigStore::load_from_dir(dir.path()).is_err());
    }
}
