use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// A decoded upload, alive only for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub raw_bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: &str, mime_type: &str, raw_bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            raw_bytes,
        }
    }
}

/// One rasterized PDF page as PNG bytes. `page_index` is 0-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_index: usize,
    pub pixels: Vec<u8>,
}

/// Raw OCR result from the engine
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    pub text: String,
    /// Engine-specific mean confidence in 0.0-1.0, when the engine reports one.
    pub confidence: Option<f32>,
}

/// Where the text of a successful outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    Pdf,
    Image,
}

/// Per-file result of a batch. Exactly one per input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Success {
        name: String,
        #[serde(rename = "diagnosisGroup")]
        diagnosis_group: Option<String>,
        source: DocumentSource,
        #[serde(rename = "hadTextLayer", skip_serializing_if = "Option::is_none")]
        had_text_layer: Option<bool>,
    },
    Failure {
        name: String,
        error: String,
    },
}

impl ExtractionOutcome {
    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. } | Self::Failure { name, .. } => name,
        }
    }

    pub fn diagnosis_group(&self) -> Option<&str> {
        match self {
            Self::Success {
                diagnosis_group, ..
            } => diagnosis_group.as_deref(),
            Self::Failure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image_bytes: &[u8], lang: &str)
        -> Result<RecognitionResult, ExtractionError>;
}

/// Embedded text layer of a PDF. An empty string means no usable layer.
pub trait PdfTextLayer: Send + Sync {
    fn extract_text_layer(&self, pdf_bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Converts every page of the PDF at `pdf_path` into numbered PNG files
/// (`page-1.png`, `page-2.png`, ...) inside `output_dir`.
pub trait PageConverter: Send + Sync {
    fn convert_to_images(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<(), ExtractionError>;
}

/// Image-to-image transform applied before OCR.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ExtractionError>;
}
