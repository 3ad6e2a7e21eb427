use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::sanitize::safe_file_name;

const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Which extraction path a document takes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Image,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
        }
    }
}

/// A document is a PDF when any signal says so: declared MIME type,
/// `.pdf` name, or `%PDF-` magic bytes. Everything else goes the image path.
pub fn classify(name: &str, mime_type: &str, bytes: &[u8]) -> DocumentKind {
    let declared = mime_type
        .split(';')
        .next()
        .is_some_and(|m| m.trim().eq_ignore_ascii_case(PDF_MIME));
    let named = mime_guess::from_path(safe_file_name(name))
        .first_raw()
        .is_some_and(|m| m == PDF_MIME);
    let magic = bytes.starts_with(PDF_MAGIC);

    if declared || named || magic {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn pdf_by_mime() {
        assert_eq!(classify("upload", "application/pdf", b""), DocumentKind::Pdf);
        assert_eq!(classify("upload", "Application/PDF; q=1", b""), DocumentKind::Pdf);
    }

    #[test]
    fn pdf_by_name_case_insensitive() {
        assert_eq!(classify("Befund.PDF", "application/octet-stream", b""), DocumentKind::Pdf);
        assert_eq!(classify("verordnung 03.pdf", "", b""), DocumentKind::Pdf);
    }

    #[test]
    fn pdf_by_magic_bytes() {
        assert_eq!(classify("scan", "image/png", b"%PDF-1.7\n"), DocumentKind::Pdf);
    }

    #[test]
    fn everything_else_is_image() {
        assert_eq!(classify("foto.jpg", "image/jpeg", &[0xFF, 0xD8, 0xFF]), DocumentKind::Image);
        assert_eq!(classify("scan.png", "image/png", PNG_MAGIC), DocumentKind::Image);
        assert_eq!(classify("pdf", "text/plain", b"%PD"), DocumentKind::Image);
    }

    #[test]
    fn kind_as_str() {
        assert_eq!(DocumentKind::Pdf.as_str(), "pdf");
        assert_eq!(DocumentKind::Image.as_str(), "image");
    }
}
