use std::panic::{self, AssertUnwindSafe};

use super::types::PdfTextLayer;
use super::ExtractionError;

/// Embedded text layer reader using the pdf-extract crate.
/// Scanned PDFs yield an empty or near-empty string.
pub struct PdfTextExtractor;

impl PdfTextLayer for PdfTextExtractor {
    fn extract_text_layer(&self, pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
        // pdf-extract panics on some malformed font tables
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(pdf_bytes)
        }))
        .map_err(|_| ExtractionError::Decode("PDF text layer reader panicked".into()))?;

        extracted.map_err(|e| ExtractionError::Decode(format!("PDF text layer: {e}")))
    }
}

/// Text layer stub for tests: a fixed string, or a parse failure.
pub struct MockPdfTextLayer {
    text: Option<String>,
}

impl MockPdfTextLayer {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn empty() -> Self {
        Self::with_text("")
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

impl PdfTextLayer for MockPdfTextLayer {
    fn extract_text_layer(&self, _pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
        self.text
            .clone()
            .ok_or_else(|| ExtractionError::Decode("mock text layer failure".into()))
    }
}
