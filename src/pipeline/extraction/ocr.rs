use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{OcrEngine, RecognitionResult};
use super::ExtractionError;

/// Form feed Tesseract appends after every page.
const PAGE_SEPARATOR: char = '\x0c';

// ── TesseractCli ──────────────────────────────────────────

/// Tesseract through its command-line binary: `tesseract <img> stdout -l <lang>`.
///
/// Needs only the `tesseract` executable and the language's traineddata,
/// no libtesseract linking.
pub struct TesseractCli {
    binary: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir: None,
        }
    }

    /// Pass `--tessdata-dir` instead of relying on TESSDATA_PREFIX.
    pub fn with_tessdata_dir(mut self, dir: &Path) -> Self {
        self.tessdata_dir = Some(dir.to_path_buf());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<RecognitionResult, ExtractionError> {
        // Removed on drop, including on early return
        let mut input = tempfile::Builder::new()
            .prefix("ocr-")
            .suffix(".png")
            .tempfile()?;
        input.write_all(image_bytes)?;
        input.flush()?;

        let mut command = Command::new(&self.binary);
        command.arg(input.path()).arg("stdout").arg("-l").arg(lang);
        if let Some(ref dir) = self.tessdata_dir {
            command.arg("--tessdata-dir").arg(dir);
        }

        let output = command.output().map_err(|e| {
            ExtractionError::Recognition(format!(
                "failed to run {}: {e}",
                self.binary.display()
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).replace(PAGE_SEPARATOR, "");
        tracing::debug!(lang, chars = text.len(), "Tesseract CLI finished");

        Ok(RecognitionResult {
            text,
            confidence: None,
        })
    }
}

// ── BundledTesseract ──────────────────────────────────────

/// Tesseract linked through libtesseract.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: PathBuf,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with a tessdata directory that holds at least one traineddata file.
    pub fn new(tessdata_dir: &Path) -> Result<Self, ExtractionError> {
        let has_traineddata = std::fs::read_dir(tessdata_dir)
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.path().extension().is_some_and(|ext| ext == "traineddata")
                })
            })
            .unwrap_or(false);
        if !has_traineddata {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
        })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn recognize(
        &self,
        image_bytes: &[u8],
        lang: &str,
    ) -> Result<RecognitionResult, ExtractionError> {
        if !self.tessdata_dir.join(format!("{lang}.traineddata")).exists() {
            tracing::warn!(
                lang,
                tessdata = %self.tessdata_dir.display(),
                "Traineddata for requested language not found"
            );
        }

        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::Recognition("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(lang))
            .map_err(|e| ExtractionError::Recognition(format!("init: {e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::Recognition(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::Recognition(format!("{e:?}")))?
            .replace(PAGE_SEPARATOR, "");

        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(RecognitionResult {
            text,
            confidence: Some(confidence),
        })
    }
}

// ── Mock ──────────────────────────────────────────────────

/// Mock OCR engine for unit testing without Tesseract.
///
/// Returns scripted texts in call order; once the script runs out the
/// last text repeats. Counts calls and records the requested languages.
pub struct MockOcrEngine {
    script: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    fail_with: Option<String>,
    calls: AtomicUsize,
    languages: Mutex<Vec<String>>,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self::scripted(&[text])
    }

    pub fn scripted(pages: &[&str]) -> Self {
        Self {
            script: Mutex::new(pages.iter().map(|p| p.to_string()).collect()),
            last: Mutex::new(String::new()),
            fail_with: None,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::scripted(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(
        &self,
        _image_bytes: &[u8],
        lang: &str,
    ) -> Result<RecognitionResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut langs) = self.languages.lock() {
            langs.push(lang.to_string());
        }
        if let Some(ref message) = self.fail_with {
            return Err(ExtractionError::Recognition(message.clone()));
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| ExtractionError::Recognition("mock state poisoned".into()))?;
        if let Some(text) = next {
            *last = text;
        }

        Ok(RecognitionResult {
            text: last.clone(),
            confidence: Some(0.9),
        })
    }
}
