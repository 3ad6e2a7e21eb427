//! PDF to page images through a scratch directory.
//!
//! Every invocation gets its own `pdfpp-XXXXXX` directory holding the PDF
//! and the rendered pages. The directory is a `TempDir`, so it is removed
//! when `rasterize` returns, fails, or unwinds.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::types::{PageConverter, PageImage};
use super::ExtractionError;

/// Rendering resolution used when the caller has no preference.
pub const DEFAULT_RASTER_DPI: u32 = 200;

const SCRATCH_PREFIX: &str = "pdfpp-";
const INPUT_FILE_NAME: &str = "document.pdf";
/// Output prefix handed to converters; pages become `page-N.png`.
pub const PAGE_FILE_PREFIX: &str = "page";

pub struct PdfRasterizer {
    converter: Box<dyn PageConverter + Send + Sync>,
    scratch_root: Option<PathBuf>,
}

impl PdfRasterizer {
    pub fn new(converter: Box<dyn PageConverter + Send + Sync>) -> Self {
        Self {
            converter,
            scratch_root: None,
        }
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: &Path) -> Self {
        self.scratch_root = Some(root.to_path_buf());
        self
    }

    /// Render every page of `pdf_bytes` at `dpi`, in page order.
    pub fn rasterize(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<PageImage>, ExtractionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match self.scratch_root {
            Some(ref root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let pdf_path = scratch.path().join(INPUT_FILE_NAME);
        std::fs::write(&pdf_path, pdf_bytes)?;

        debug!(dir = %scratch.path().display(), dpi, "Rasterizing PDF");
        self.converter
            .convert_to_images(&pdf_path, scratch.path(), dpi)?;

        let page_files = collect_page_files(scratch.path())?;
        if page_files.is_empty() {
            return Err(ExtractionError::Rasterization(
                "converter produced no page images".into(),
            ));
        }

        let pages = page_files
            .into_iter()
            .enumerate()
            .map(|(page_index, (_, path))| {
                let pixels = std::fs::read(&path)?;
                Ok(PageImage { page_index, pixels })
            })
            .collect::<Result<Vec<_>, ExtractionError>>()?;

        info!(pages = pages.len(), dpi, "PDF rasterized");
        Ok(pages)
    }
}

/// `*-N.png` files in `dir`, sorted by N.
/// Zero-padded numbers (`page-01.png`) sort numerically as well.
fn collect_page_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>, ExtractionError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| stem.rsplit_once('-'))
            .and_then(|(_, n)| n.parse::<usize>().ok());
        if let Some(number) = number {
            files.push((number, path));
        }
    }
    files.sort_by_key(|(number, _)| *number);
    Ok(files)
}

// ── pdftoppm ──────────────────────────────────────────────

/// Poppler's `pdftoppm -png -r <dpi> <pdf> <dir>/page`.
pub struct PdftoppmConverter {
    binary: PathBuf,
}

impl PdftoppmConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftoppmConverter {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PageConverter for PdftoppmConverter {
    fn convert_to_images(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<(), ExtractionError> {
        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf_path)
            .arg(output_dir.join(PAGE_FILE_PREFIX))
            .output()
            .map_err(|e| {
                ExtractionError::Rasterization(format!(
                    "failed to run {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Rasterization(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Writes placeholder `page-N.png` files (body `page N`) without any
/// PDF tooling, or fails like a crashed converter.
pub struct MockPageConverter {
    pages: Option<usize>,
}

impl MockPageConverter {
    pub fn new(pages: usize) -> Self {
        Self { pages: Some(pages) }
    }

    pub fn failing() -> Self {
        Self { pages: None }
    }
}

impl PageConverter for MockPageConverter {
    fn convert_to_images(
        &self,
        _pdf_path: &Path,
        output_dir: &Path,
        _dpi: u32,
    ) -> Result<(), ExtractionError> {
        let pages = self
            .pages
            .ok_or_else(|| ExtractionError::Rasterization("mock converter failure".into()))?;
        for n in 1..=pages {
            std::fs::write(
                output_dir.join(format!("{PAGE_FILE_PREFIX}-{n}.png")),
                format!("page {n}"),
            )?;
        }
        Ok(())
    }
}
