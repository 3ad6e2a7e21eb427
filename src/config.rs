use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::extraction::diagnosis_group::{
    normalize_code, AllowedCodeSet, DiagnosisGroupExtractor, DEFAULT_GROUP_MARKER,
};
use crate::pipeline::extraction::ocr::TesseractCli;
use crate::pipeline::extraction::orchestrator::{
    DocumentPipeline, PipelineSettings, DEFAULT_OCR_LANGUAGE, DEFAULT_PIPELINE_DPI,
    DEFAULT_TEXT_LAYER_MIN_CHARS,
};
use crate::pipeline::extraction::pdf::PdfTextExtractor;
use crate::pipeline::extraction::pdfium::PdfiumConverter;
use crate::pipeline::extraction::preprocess::{
    OcrPreprocessor, PreprocessConfig, DEFAULT_BINARIZE_THRESHOLD,
};
use crate::pipeline::extraction::rasterize::{PdfRasterizer, PdftoppmConverter};
use crate::pipeline::extraction::types::{OcrEngine, PageConverter};

/// Application-level constants
pub const APP_NAME: &str = "diagnosis-ocr";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_JSON_LIMIT: &str = "25mb";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,diagnosis_ocr_lib=debug,tower_http=debug"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Pipeline setup failed: {0}")]
    Pipeline(String),
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Which backend turns PDF pages into images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterizerKind {
    Pdftoppm,
    Pdfium,
}

/// Everything the service reads from its environment.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Maximum accepted request body, in bytes.
    pub json_limit_bytes: usize,
    pub allowed_codes: AllowedCodeSet,
    pub group_marker: String,
    pub language: String,
    pub pdf_dpi: u32,
    pub binarize_threshold: u8,
    pub text_layer_min_chars: usize,
    pub rasterizer: RasterizerKind,
    pub pdftoppm_path: PathBuf,
    pub tesseract_path: PathBuf,
    pub tessdata_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            json_limit_bytes: 25 * 1024 * 1024,
            allowed_codes: AllowedCodeSet::default(),
            group_marker: DEFAULT_GROUP_MARKER.to_string(),
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            pdf_dpi: DEFAULT_PIPELINE_DPI,
            binarize_threshold: DEFAULT_BINARIZE_THRESHOLD,
            text_layer_min_chars: DEFAULT_TEXT_LAYER_MIN_CHARS,
            rasterizer: RasterizerKind::Pdftoppm,
            pdftoppm_path: PathBuf::from("pdftoppm"),
            tesseract_path: PathBuf::from("tesseract"),
            tessdata_dir: None,
            scratch_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("OCR_BIND_ADDR") {
            config.bind_addr = v
                .trim()
                .parse()
                .map_err(|e| invalid("OCR_BIND_ADDR", &v, format!("{e}")))?;
        }
        if let Some(v) = get("PORT") {
            config.port = parse_number("PORT", &v)?;
        }
        let limit = get("DOCUMENTS_JSON_LIMIT").unwrap_or_else(|| DEFAULT_JSON_LIMIT.to_string());
        config.json_limit_bytes = parse_byte_limit(&limit)
            .map_err(|reason| invalid("DOCUMENTS_JSON_LIMIT", &limit, reason))?;

        if let Some(v) = get("OCR_ALLOWED_CODES") {
            let codes = AllowedCodeSet::new(v.split(','));
            if codes.is_empty() {
                return Err(invalid("OCR_ALLOWED_CODES", &v, "no codes listed"));
            }
            // Candidates are normalized before lookup, so anything else never matches
            if let Some(code) = codes.iter().find(|c| normalize_code(c) != *c) {
                return Err(invalid(
                    "OCR_ALLOWED_CODES",
                    &v,
                    format!("{code} is read from documents as {}", normalize_code(code)),
                ));
            }
            config.allowed_codes = codes;
        }
        if let Some(v) = get("OCR_GROUP_MARKER") {
            config.group_marker = v.trim().to_string();
        }
        if let Some(v) = get("OCR_LANGUAGE") {
            config.language = v.trim().to_string();
        }
        if let Some(v) = get("OCR_PDF_DPI") {
            let dpi: u32 = parse_number("OCR_PDF_DPI", &v)?;
            if !(36..=1200).contains(&dpi) {
                return Err(invalid("OCR_PDF_DPI", &v, "expected 36..=1200"));
            }
            config.pdf_dpi = dpi;
        }
        if let Some(v) = get("OCR_BINARIZE_THRESHOLD") {
            config.binarize_threshold = parse_number("OCR_BINARIZE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("OCR_TEXT_LAYER_MIN_CHARS") {
            config.text_layer_min_chars = parse_number("OCR_TEXT_LAYER_MIN_CHARS", &v)?;
        }
        if let Some(v) = get("OCR_RASTERIZER") {
            config.rasterizer = match v.trim().to_ascii_lowercase().as_str() {
                "pdftoppm" => RasterizerKind::Pdftoppm,
                "pdfium" => RasterizerKind::Pdfium,
                _ => return Err(invalid("OCR_RASTERIZER", &v, "expected pdftoppm or pdfium")),
            };
        }
        if let Some(v) = get("PDFTOPPM_PATH") {
            config.pdftoppm_path = PathBuf::from(v);
        }
        if let Some(v) = get("TESSERACT_PATH") {
            config.tesseract_path = PathBuf::from(v);
        }
        config.tessdata_dir = get("TESSDATA_PREFIX").map(PathBuf::from);
        config.scratch_dir = get("OCR_SCRATCH_DIR").map(PathBuf::from);

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Wire the configured engines into a pipeline.
    pub fn build_pipeline(&self) -> Result<DocumentPipeline, ConfigError> {
        let converter: Box<dyn PageConverter + Send + Sync> = match self.rasterizer {
            RasterizerKind::Pdftoppm => Box::new(PdftoppmConverter::new(&self.pdftoppm_path)),
            RasterizerKind::Pdfium => Box::new(
                PdfiumConverter::new().map_err(|e| ConfigError::Pipeline(e.to_string()))?,
            ),
        };
        let mut rasterizer = PdfRasterizer::new(converter);
        if let Some(ref root) = self.scratch_dir {
            std::fs::create_dir_all(root).map_err(|e| {
                ConfigError::Pipeline(format!("scratch dir {}: {e}", root.display()))
            })?;
            rasterizer = rasterizer.with_scratch_root(root);
        }

        let extractor = DiagnosisGroupExtractor::new(self.allowed_codes.clone(), &self.group_marker)
            .map_err(|e| invalid("OCR_GROUP_MARKER", &self.group_marker, e.to_string()))?;

        let preprocessor = OcrPreprocessor::new(PreprocessConfig {
            binarize_threshold: self.binarize_threshold,
            ..PreprocessConfig::default()
        });

        Ok(DocumentPipeline::new(
            self.ocr_engine()?,
            Box::new(PdfTextExtractor),
            rasterizer,
            extractor,
        )
        .with_preprocessor(Box::new(preprocessor))
        .with_settings(PipelineSettings {
            language: self.language.clone(),
            pdf_dpi: self.pdf_dpi,
            text_layer_min_chars: self.text_layer_min_chars,
        }))
    }

    #[cfg(feature = "ocr")]
    fn ocr_engine(&self) -> Result<Box<dyn OcrEngine + Send + Sync>, ConfigError> {
        use crate::pipeline::extraction::ocr::BundledTesseract;

        match self.tessdata_dir {
            Some(ref dir) => Ok(Box::new(
                BundledTesseract::new(dir).map_err(|e| ConfigError::Pipeline(e.to_string()))?,
            )),
            None => Ok(Box::new(TesseractCli::new(&self.tesseract_path))),
        }
    }

    #[cfg(not(feature = "ocr"))]
    fn ocr_engine(&self) -> Result<Box<dyn OcrEngine + Send + Sync>, ConfigError> {
        let mut engine = TesseractCli::new(&self.tesseract_path);
        if let Some(ref dir) = self.tessdata_dir {
            engine = engine.with_tessdata_dir(dir);
        }
        Ok(Box::new(engine))
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, e.to_string()))
}

/// Parse a size such as `25mb`, `512kb`, `1.5gb` or `1048576` into bytes.
/// Units are binary (1kb = 1024 bytes) and case-insensitive.
pub fn parse_byte_limit(raw: &str) -> Result<usize, String> {
    let lower = raw.trim().to_ascii_lowercase();
    let split = lower
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(split);

    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("unknown unit {other:?}")),
    };
    let value: f64 = number
        .parse()
        .map_err(|_| format!("{number:?} is not a number"))?;
    let bytes = (value * multiplier).floor();
    if !bytes.is_finite() || bytes < 1.0 || bytes > usize::MAX as f64 {
        return Err("limit out of range".into());
    }
    Ok(bytes as usize)
}
