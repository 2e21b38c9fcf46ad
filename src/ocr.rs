use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, GrayImage, Luma};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::preprocess;

pub const DIGIT_WHITELIST: &str = "0123456789";

/// Install locations probed when no override path is configured.
const COMMON_TESSERACT_PATHS: [&str; 3] = [
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    "/usr/bin/tesseract",
];

#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine cannot be invoked at all. Fatal for the whole decode.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but failed on this image. Treated as "no result".
    #[error("OCR failed: {0}")]
    Failed(String),
}

/// How the engine should segment the candidate image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    SingleChar,
    SingleLine,
    SingleWord,
}

impl SegmentationMode {
    /// Tesseract `--psm` value.
    pub fn psm(self) -> u8 {
        match self {
            SegmentationMode::SingleChar => 10,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SingleWord => 8,
        }
    }
}

/// Tried in order for every candidate image.
pub const RECOGNITION_MODES: [SegmentationMode; 3] = [
    SegmentationMode::SingleChar,
    SegmentationMode::SingleLine,
    SegmentationMode::SingleWord,
];

/// Text recognition capability. Implementations must restrict output to
/// digits and honour the requested segmentation mode.
pub trait OcrEngine: Send + Sync {
    fn ensure_available(&self) -> Result<(), OcrError>;

    fn recognize(&self, png: &[u8], mode: SegmentationMode) -> Result<String, OcrError>;
}

/// A successful single-digit read and how it was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recognition {
    pub digit: char,
    pub stage: &'static str,
    pub mode: SegmentationMode,
}

/// Accept exactly one ASCII digit after trimming whitespace.
pub fn parse_digit(text: &str) -> Option<char> {
    let mut chars = text.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_digit() => Some(c),
        _ => None,
    }
}

/// Walk the preprocessing ladder and, for each candidate, every
/// segmentation mode until one yields a single digit.
///
/// Per-image failures are absorbed. Only `OcrError::Unavailable` escapes.
pub fn recognize_button<O: OcrEngine + ?Sized>(
    engine: &O,
    crop: &DynamicImage,
) -> Result<Option<Recognition>, OcrError> {
    for (stage, candidate) in preprocess::candidates(crop) {
        let png = match preprocess::encode_png(&candidate) {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("failed to encode {stage} candidate: {e}");
                continue;
            }
        };

        for mode in RECOGNITION_MODES {
            let text = match engine.recognize(&png, mode) {
                Ok(text) => text,
                Err(OcrError::Failed(msg)) => {
                    tracing::debug!("{stage}/psm {}: {msg}", mode.psm());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(digit) = parse_digit(&text) {
                return Ok(Some(Recognition { digit, stage, mode }));
            }
            tracing::trace!("{stage}/psm {}: rejected {:?}", mode.psm(), text.trim());
        }
    }

    Ok(None)
}

/// Tesseract invoked as a subprocess.
#[derive(Debug, Clone)]
pub struct Tesseract {
    executable: PathBuf,
}

impl Tesseract {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Resolve the executable: explicit override, then common install
    /// locations, then whatever `tesseract` is on `PATH`.
    pub fn locate(override_path: Option<&Path>) -> Self {
        if let Some(path) = override_path {
            return Self::new(path);
        }

        let found = COMMON_TESSERACT_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("tesseract"));

        Self::new(found)
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => OcrError::Unavailable(format!(
                "{}: {e} (install tesseract or set LOTTO_TESSERACT_PATH)",
                self.executable.display()
            )),
            _ => OcrError::Failed(format!("{}: {e}", self.executable.display())),
        }
    }
}

/// Command-line arguments after the input path.
fn recognition_args(mode: SegmentationMode) -> Vec<String> {
    vec![
        "stdout".into(),
        "--oem".into(),
        "3".into(),
        "--psm".into(),
        mode.psm().to_string(),
        "-c".into(),
        format!("tessedit_char_whitelist={DIGIT_WHITELIST}"),
    ]
}

impl OcrEngine for Tesseract {
    fn ensure_available(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(OcrError::Unavailable(format!(
                "{} --version exited with {}",
                self.executable.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            "tesseract at {}: {}",
            self.executable.display(),
            stdout.lines().next().unwrap_or_default()
        );

        // --version succeeds even without language data; a blank page must OCR cleanly
        let blank = preprocess::encode_png(&GrayImage::from_pixel(16, 16, Luma([255])))
            .map_err(|e| OcrError::Unavailable(format!("self-check image: {e}")))?;
        match self.recognize(&blank, SegmentationMode::SingleChar) {
            Ok(_) => Ok(()),
            Err(OcrError::Failed(msg)) => Err(OcrError::Unavailable(format!(
                "{} cannot recognize: {msg}",
                self.executable.display()
            ))),
            Err(e) => Err(e),
        }
    }

    fn recognize(&self, png: &[u8], mode: SegmentationMode) -> Result<String, OcrError> {
        let mut input = NamedTempFile::with_suffix(".png")
            .map_err(|e| OcrError::Failed(format!("temp file: {e}")))?;
        input
            .write_all(png)
            .and_then(|_| input.flush())
            .map_err(|e| OcrError::Failed(format!("temp file: {e}")))?;

        let output = Command::new(&self.executable)
            .arg(input.path())
            .args(recognition_args(mode))
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(format!("tesseract exited with {}: {}", output.status, stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
