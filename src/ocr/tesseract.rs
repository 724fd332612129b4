//! Tesseract CLI backend.

use std::process::Command;

use image::GrayImage;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::TextRecognizer;
use crate::config::TesseractConfig;
use crate::error::ExtractError;

pub struct TesseractRecognizer {
    config: TesseractConfig,
}

impl TesseractRecognizer {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    /// Check the binary can be spawned at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.command)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn command(&self, input: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg(input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.language)
            .arg("--oem")
            .arg(self.config.oem.to_string())
            .arg("--psm")
            .arg(self.config.psm.to_string());
        cmd
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<String, ExtractError> {
        // Removed on drop, so concurrent calls never share a file.
        let input = NamedTempFile::with_suffix(".png")?;
        image
            .save_with_format(input.path(), image::ImageFormat::Png)
            .map_err(|e| ExtractError::Recognizer(format!("Failed to write temp image: {}", e)))?;

        debug!("Running {:?} on {:?}", self.config.command, input.path());
        let output = self.command(input.path()).output().map_err(|e| {
            ExtractError::Recognizer(format!(
                "Failed to run {:?}: {}",
                self.config.command, e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Recognizer(format!(
                "Tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!("Tesseract returned {} chars", text.len());
        Ok(text)
    }
}
