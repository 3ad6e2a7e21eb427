use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PayloadError;
use crate::pipeline::extraction::{ExtractionError, SourceFile};

/// Browsers and scanner apps are inconsistent about trailing `=`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One uploaded file as it travels in the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFile {
    pub name: String,
    #[serde(alias = "mimeType")]
    pub mime: String,
    /// Base64, optionally behind a `data:<mime>;base64,` header.
    pub data: String,
}

impl EncodedFile {
    pub fn new(name: &str, mime: &str, data: &str) -> Self {
        Self {
            name: name.to_string(),
            mime: mime.to_string(),
            data: data.to_string(),
        }
    }

    pub fn decode(&self) -> Result<SourceFile, ExtractionError> {
        let bytes = decode_data_url(&self.data)?;
        Ok(SourceFile::new(&self.name, &self.mime, bytes))
    }
}

/// Decode a data URL or bare base64 string. Whitespace inside the payload is ignored.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, ExtractionError> {
    let base64_data = match data_url.find(',') {
        Some(idx) => &data_url[idx + 1..],
        None => data_url,
    };
    let compact: String = base64_data.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = LENIENT_BASE64
        .decode(compact)
        .map_err(|e| ExtractionError::Decode(format!("Base64 decode failed: {e}")))?;
    if bytes.is_empty() {
        return Err(ExtractionError::Decode("Document is empty".into()));
    }
    Ok(bytes)
}

/// Validate the request envelope `{ "files": [ { name, mime|mimeType, data } ] }`.
///
/// Checks every entry before returning so a bad file rejects the whole
/// request up front instead of surfacing halfway through a batch.
pub fn parse_batch(body: &Value) -> Result<Vec<EncodedFile>, PayloadError> {
    let files = body
        .get("files")
        .and_then(Value::as_array)
        .filter(|files| !files.is_empty())
        .ok_or(PayloadError::MissingFiles)?;

    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let field = |key: &str| {
                file.get(key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
            };
            match (field("name"), field("mime").or_else(|| field("mimeType")), field("data")) {
                (Some(name), Some(mime), Some(data)) => Ok(EncodedFile::new(name, mime, data)),
                _ => Err(PayloadError::InvalidFileObject { index }),
            }
        })
        .collect()
}
