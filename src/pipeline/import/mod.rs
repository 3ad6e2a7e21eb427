pub mod format;
pub mod payload;

pub use format::*;
pub use payload::*;

use thiserror::Error;

/// Request-level rejection, raised before any file is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Request must contain a non-empty `files` array")]
    MissingFiles,

    #[error("File #{index} needs a non-empty `name`, `mime` and `data`")]
    InvalidFileObject { index: usize },
}

impl PayloadError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFiles => "MISSING_FILES",
            Self::InvalidFileObject { .. } => "INVALID_FILE_OBJECT",
        }
    }
}
