pub mod types;
pub mod sanitize;
pub mod diagnosis_group;
pub mod preprocess;
pub mod pdf;
pub mod ocr;
pub mod rasterize;
pub mod pdfium;
pub mod orchestrator;

pub use types::*;
pub use sanitize::*;
pub use diagnosis_group::*;
pub use preprocess::*;
pub use pdf::*;
pub use ocr::*;
pub use rasterize::*;
pub use orchestrator::*;

#[cfg(feature = "ocr")]
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to decode document: {0}")]
    Decode(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("PDF rasterization failed: {0}")]
    Rasterization(String),

    #[error("OCR recognition failed: {0}")]
    Recognition(String),

    #[error("Document processing panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "ocr")]
    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),
}
