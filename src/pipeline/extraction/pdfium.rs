//! PDF page rendering via Google PDFium, for hosts without poppler.
//!
//! `PdfiumConverter` is stateless (`Send + Sync`). Each conversion creates
//! a fresh `Pdfium` instance because the upstream type is `!Send`.
//! The OS caches `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::path::Path;

use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::rasterize::PAGE_FILE_PREFIX;
use super::types::PageConverter;
use super::ExtractionError;

/// Maximum dimension (width or height) for rendered page images.
/// Prevents OOM on extremely large pages or absurd DPI settings.
const MAX_DIMENSION_PX: u32 = 4096;

/// PDF points per inch (standard PDF unit).
const POINTS_PER_INCH: f32 = 72.0;

/// Writes `page-N.png` files like pdftoppm, rendered by PDFium.
pub struct PdfiumConverter;

impl PdfiumConverter {
    /// Create a converter, verifying the PDFium library is loadable.
    ///
    /// Discovery order:
    /// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path to library file)
    /// 2. Alongside the running executable, or in `<exe_dir>/pdfium/lib`
    /// 3. System library search paths
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::Rasterization(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [
                exe_dir.to_path_buf(),
                exe_dir.join("pdfium").join("lib"),
            ];

            for dir in &candidates {
                let lib_path = Pdfium::pdfium_platform_library_name_at_path(
                    dir.to_string_lossy().as_ref(),
                );
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::Rasterization(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Compute pixel dimensions for rendering, applying the dimension guard.
///
/// Returns (width_px, height_px), both clamped to [1, MAX_DIMENSION_PX].
/// Preserves aspect ratio when capping.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

impl PageConverter for PdfiumConverter {
    fn convert_to_images(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        dpi: u32,
    ) -> Result<(), ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| ExtractionError::Rasterization(format!("Failed to load PDF: {e}")))?;

        for (index, page) in document.pages().iter().enumerate() {
            let page_number = index + 1;
            let (width_points, height_points) = (page.width().value, page.height().value);
            let (target_w, target_h) = compute_render_dimensions(width_points, height_points, dpi);
            let uncapped = width_points.max(height_points) * dpi as f32 / POINTS_PER_INCH;
            if uncapped > MAX_DIMENSION_PX as f32 {
                warn!(
                    page = page_number,
                    width = target_w,
                    height = target_h,
                    "Page dimensions capped to {MAX_DIMENSION_PX}px",
                );
            }

            let config = PdfRenderConfig::new()
                .set_target_width(target_w as i32)
                .set_maximum_height(target_h as i32);

            let bitmap = page.render_with_config(&config).map_err(|e| {
                ExtractionError::Rasterization(format!("Rendering page {page_number} failed: {e}"))
            })?;

            let target = output_dir.join(format!("{PAGE_FILE_PREFIX}-{page_number}.png"));
            bitmap
                .as_image()
                .save_with_format(&target, ImageFormat::Png)
                .map_err(|e| {
                    ExtractionError::Rasterization(format!(
                        "Writing page {page_number} failed: {e}"
                    ))
                })?;

            debug!(page = page_number, width = target_w, height = target_h, "Rendered PDF page");
        }

        Ok(())
    }
}
