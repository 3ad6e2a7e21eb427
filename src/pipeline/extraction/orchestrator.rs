use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::diagnosis_group::DiagnosisGroupExtractor;
use super::preprocess::OcrPreprocessor;
use super::rasterize::PdfRasterizer;
use super::sanitize::{is_mostly_empty, normalize_text, safe_file_name};
use super::types::{
    DocumentSource, ExtractionOutcome, ImagePreprocessor, OcrEngine, PdfTextLayer, SourceFile,
};
use super::ExtractionError;
use crate::pipeline::import::format::{classify, DocumentKind};
use crate::pipeline::import::payload::EncodedFile;

pub const DEFAULT_OCR_LANGUAGE: &str = "deu";
pub const DEFAULT_PIPELINE_DPI: u32 = 220;
pub const DEFAULT_TEXT_LAYER_MIN_CHARS: usize = 30;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Tesseract language string, e.g. `deu` or `deu+eng`.
    pub language: String,
    pub pdf_dpi: u32,
    /// Text layers with fewer non-whitespace characters count as absent.
    pub text_layer_min_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            pdf_dpi: DEFAULT_PIPELINE_DPI,
            text_layer_min_chars: DEFAULT_TEXT_LAYER_MIN_CHARS,
        }
    }
}

/// Turns uploaded documents into diagnosis-group outcomes.
///
/// Engines are trait objects so tests can inject mocks. The pipeline holds
/// no mutable state and can be shared across threads behind an `Arc`.
pub struct DocumentPipeline {
    ocr_engine: Box<dyn OcrEngine + Send + Sync>,
    text_layer: Box<dyn PdfTextLayer + Send + Sync>,
    rasterizer: PdfRasterizer,
    preprocessor: Box<dyn ImagePreprocessor + Send + Sync>,
    extractor: DiagnosisGroupExtractor,
    settings: PipelineSettings,
}

/// OCR text accumulated across pages of one PDF.
#[derive(Debug, Default)]
struct PageScan {
    text: String,
    pages_read: usize,
    code: Option<String>,
}

impl PageScan {
    fn append(&mut self, page_text: &str) {
        self.text.push('\n');
        self.text.push_str(page_text);
        self.pages_read += 1;
    }
}

impl DocumentPipeline {
    pub fn new(
        ocr_engine: Box<dyn OcrEngine + Send + Sync>,
        text_layer: Box<dyn PdfTextLayer + Send + Sync>,
        rasterizer: PdfRasterizer,
        extractor: DiagnosisGroupExtractor,
    ) -> Self {
        Self {
            ocr_engine,
            text_layer,
            rasterizer,
            preprocessor: Box::new(OcrPreprocessor::default()),
            extractor,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_preprocessor(
        mut self,
        preprocessor: Box<dyn ImagePreprocessor + Send + Sync>,
    ) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// One outcome per file, in input order. A failing file never aborts the batch.
    pub fn process(&self, batch: &[SourceFile]) -> Vec<ExtractionOutcome> {
        let batch_id = Uuid::new_v4();
        let _span = tracing::info_span!("batch", batch_id = %batch_id).entered();
        info!(files = batch.len(), "Processing document batch");

        let outcomes: Vec<_> = batch.iter().map(|file| self.process_file(file)).collect();
        log_batch_summary(&outcomes);
        outcomes
    }

    /// Like [`process`](Self::process), decoding each transport payload first.
    /// A payload that fails to decode becomes that file's failure outcome.
    pub fn process_encoded(&self, batch: &[EncodedFile]) -> Vec<ExtractionOutcome> {
        let batch_id = Uuid::new_v4();
        let _span = tracing::info_span!("batch", batch_id = %batch_id).entered();
        info!(files = batch.len(), "Processing encoded document batch");

        let outcomes: Vec<_> = batch
            .iter()
            .map(|encoded| match encoded.decode() {
                Ok(file) => self.process_file(&file),
                Err(e) => failure(&encoded.name, e),
            })
            .collect();
        log_batch_summary(&outcomes);
        outcomes
    }

    pub fn process_file(&self, file: &SourceFile) -> ExtractionOutcome {
        let kind = classify(&file.name, &file.mime_type, &file.raw_bytes);
        debug!(
            file = %safe_file_name(&file.name),
            kind = kind.as_str(),
            bytes = file.raw_bytes.len(),
            "Classified document"
        );

        // One file's panic must not take its siblings down with it
        let result = panic::catch_unwind(AssertUnwindSafe(|| match kind {
            DocumentKind::Pdf => self.process_pdf(file),
            DocumentKind::Image => self.process_image(file),
        }))
        .unwrap_or_else(|payload| {
            Err(ExtractionError::Panicked(panic_message(payload.as_ref())))
        });

        match result {
            Ok(outcome) => {
                info!(
                    file = %safe_file_name(&file.name),
                    diagnosis_group = outcome.diagnosis_group().unwrap_or("-"),
                    "Document processed"
                );
                outcome
            }
            Err(e) => failure(&file.name, e),
        }
    }

    fn process_pdf(&self, file: &SourceFile) -> Result<ExtractionOutcome, ExtractionError> {
        let layer = match self.text_layer.extract_text_layer(&file.raw_bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    file = %safe_file_name(&file.name),
                    error = %e,
                    "Text layer unreadable, treating as empty"
                );
                String::new()
            }
        };
        let had_text_layer = !is_mostly_empty(&layer, self.settings.text_layer_min_chars);

        let mut scan = PageScan::default();
        if !had_text_layer {
            let pages = self.rasterizer.rasterize(&file.raw_bytes, self.settings.pdf_dpi)?;
            for page in &pages {
                let prepared = self.preprocessor.preprocess(&page.pixels)?;
                let recognized = self
                    .ocr_engine
                    .recognize(&prepared, &self.settings.language)?;
                scan.append(&recognized.text);

                debug!(
                    page = page.page_index + 1,
                    of = pages.len(),
                    chars = recognized.text.len(),
                    "Page recognized"
                );

                if let Some(code) = self.extractor.extract(&normalize_text(&scan.text)) {
                    scan.code = Some(code);
                    break;
                }
            }
            debug!(pages_read = scan.pages_read, found = scan.code.is_some(), "Page scan finished");
        }

        let diagnosis_group = match scan.code {
            Some(code) => Some(code),
            None => {
                let combined = normalize_text(&format!("{layer}\n{}", scan.text));
                self.extractor.extract(&combined)
            }
        };

        Ok(ExtractionOutcome::Success {
            name: file.name.clone(),
            diagnosis_group,
            source: DocumentSource::Pdf,
            had_text_layer: Some(had_text_layer),
        })
    }

    fn process_image(&self, file: &SourceFile) -> Result<ExtractionOutcome, ExtractionError> {
        let prepared = self.preprocessor.preprocess(&file.raw_bytes)?;
        let recognized = self
            .ocr_engine
            .recognize(&prepared, &self.settings.language)?;
        let diagnosis_group = self.extractor.extract(&normalize_text(&recognized.text));

        Ok(ExtractionOutcome::Success {
            name: file.name.clone(),
            diagnosis_group,
            source: DocumentSource::Image,
            had_text_layer: None,
        })
    }
}

fn failure(name: &str, error: ExtractionError) -> ExtractionOutcome {
    warn!(file = %safe_file_name(name), error = %error, "Document failed");
    ExtractionOutcome::Failure {
        name: name.to_string(),
        error: error.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_batch_summary(outcomes: &[ExtractionOutcome]) {
    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    let found = outcomes.iter().filter(|o| o.diagnosis_group().is_some()).count();
    info!(
        files = outcomes.len(),
        found,
        missed = outcomes.len() - failed - found,
        failed,
        "Batch complete"
    );
}
