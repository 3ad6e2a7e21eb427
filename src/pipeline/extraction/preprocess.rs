//! Image preparation for Tesseract: upright, grayscale, contrast-stretched,
//! upscaled when narrow, then binarized.
//!
//! Tesseract reads black glyphs on white paper best at roughly 300 DPI.
//! Phone photos arrive rotated via EXIF and washed out; low-DPI scans
//! arrive too narrow. Each step below targets one of those.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat};
use tracing::debug;

use super::types::ImagePreprocessor;
use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
/// Prevents OOM on corrupt/adversarial files.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Decoded size limit, checked from the image header before decoding.
/// A few hundred bytes of PNG can declare gigapixels.
const MAX_DECODED_PIXELS: u64 = 100_000_000;

/// Pixels darker than the 1st or brighter than the 99th luminance
/// percentile are clipped by the contrast stretch.
const STRETCH_LOW_PERCENTILE: f64 = 0.01;
const STRETCH_HIGH_PERCENTILE: f64 = 0.99;

pub const DEFAULT_UPSCALE_BELOW_WIDTH: u32 = 1600;
pub const DEFAULT_UPSCALE_TO_WIDTH: u32 = 1800;
pub const DEFAULT_BINARIZE_THRESHOLD: u8 = 170;
pub const DEFAULT_MAX_INPUT_DIMENSION: u32 = 4096;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Resize filter quality.
///
/// CatmullRom keeps glyph edges crisp without Lanczos ringing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeQuality {
    /// CatmullRom (cubic spline).
    High,
    /// Triangle (bilinear). Faster, slightly softer glyphs.
    Fast,
}

impl ResizeQuality {
    fn filter(self) -> FilterType {
        match self {
            Self::High => FilterType::CatmullRom,
            Self::Fast => FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Images narrower than this are upscaled. `0` disables upscaling.
    pub upscale_below_width: u32,
    /// Target width of the upscale; height follows the aspect ratio.
    pub upscale_to_width: u32,
    /// Luminance at or above this becomes white, everything else black.
    pub binarize_threshold: u8,
    pub resize_filter: ResizeQuality,
    /// Longest edge allowed through the chain. Larger inputs are
    /// downscaled first and the upscale never grows past it.
    pub max_input_dimension: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            upscale_below_width: DEFAULT_UPSCALE_BELOW_WIDTH,
            upscale_to_width: DEFAULT_UPSCALE_TO_WIDTH,
            binarize_threshold: DEFAULT_BINARIZE_THRESHOLD,
            resize_filter: ResizeQuality::High,
            max_input_dimension: DEFAULT_MAX_INPUT_DIMENSION,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// OcrPreprocessor
// ═══════════════════════════════════════════════════════════

/// Default preprocessing chain. Output is always a PNG.
pub struct OcrPreprocessor {
    config: PreprocessConfig,
}

impl OcrPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }
}

impl Default for OcrPreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl ImagePreprocessor for OcrPreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ExtractionError> {
        validate_image_bytes(image_bytes)?;
        validate_declared_dimensions(image_bytes)?;

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::Decode(format!("Unsupported or corrupt image: {e}")))?;

        let orientation = read_exif_orientation(image_bytes);
        let img = apply_orientation(img, orientation);
        let (orig_w, orig_h) = img.dimensions();

        let mut gray = pre_downscale(img.to_luma8(), self.config.max_input_dimension);
        stretch_contrast(&mut gray);
        let mut gray = upscale_if_narrow(gray, &self.config);
        binarize(&mut gray, self.config.binarize_threshold);

        debug!(
            orientation,
            from = format!("{orig_w}x{orig_h}"),
            to = format!("{}x{}", gray.width(), gray.height()),
            threshold = self.config.binarize_threshold,
            "Image preprocessed for OCR"
        );

        encode_png(gray)
    }
}

// ── Steps ─────────────────────────────────────────────────

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not found.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Linearly map the 1st..99th luminance percentile onto 0..255.
/// Uniform images are left untouched.
pub fn stretch_contrast(gray: &mut GrayImage) {
    let Some((low, high)) = luminance_bounds(gray) else {
        return;
    };
    if high <= low {
        return;
    }
    let span = f32::from(high - low);
    for pixel in gray.pixels_mut() {
        let v = pixel.0[0].clamp(low, high);
        pixel.0[0] = (f32::from(v - low) * 255.0 / span).round() as u8;
    }
}

fn luminance_bounds(gray: &GrayImage) -> Option<(u8, u8)> {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let low = percentile(&histogram, total, STRETCH_LOW_PERCENTILE);
    let high = percentile(&histogram, total, STRETCH_HIGH_PERCENTILE);
    Some((low, high))
}

/// Smallest luminance whose cumulative count reaches `fraction` of `total`.
fn percentile(histogram: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let target = ((total as f64 * fraction).ceil() as u64).max(1);
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as u8;
        }
    }
    u8::MAX
}

/// Shrink so the longest edge fits `max_dim`. `0` disables the cap.
fn pre_downscale(gray: GrayImage, max_dim: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let largest = w.max(h);
    if max_dim == 0 || largest <= max_dim {
        return gray;
    }

    let scale = max_dim as f64 / largest as f64;
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_dim);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Pre-downscaling oversized image"
    );
    image::imageops::resize(&gray, new_w, new_h, FilterType::Triangle)
}

/// Grow narrow images towards `upscale_to_width`, keeping the aspect ratio
/// and never letting either edge pass `max_input_dimension`.
fn upscale_if_narrow(gray: GrayImage, config: &PreprocessConfig) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 || w >= config.upscale_below_width || config.upscale_to_width <= w {
        return gray;
    }

    let mut scale = config.upscale_to_width as f64 / w as f64;
    if config.max_input_dimension > 0 {
        let cap = config.max_input_dimension as f64;
        scale = scale.min(cap / w as f64).min(cap / h as f64);
    }
    if scale <= 1.0 {
        return gray;
    }

    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(&gray, new_w, new_h, config.resize_filter.filter())
}

/// Pixels `>= threshold` become white (255), the rest black (0).
pub fn binarize(gray: &mut GrayImage, threshold: u8) {
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= threshold { 255 } else { 0 };
    }
}

/// Validate image bytes before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(
            "Image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageProcessing(format!(
            "Image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Reject images whose header declares more than `MAX_DECODED_PIXELS`.
/// Unreadable headers are left for the decoder to report.
fn validate_declared_dimensions(bytes: &[u8]) -> Result<(), ExtractionError> {
    let dimensions = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok());

    if let Some((w, h)) = dimensions {
        if u64::from(w) * u64::from(h) > MAX_DECODED_PIXELS {
            return Err(ExtractionError::ImageProcessing(format!(
                "Image declares {w}x{h} pixels, above the {MAX_DECODED_PIXELS} pixel limit"
            )));
        }
    }
    Ok(())
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(gray: GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(gray);
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Mock
// ═══════════════════════════════════════════════════════════

/// Returns the input unchanged, or always fails.
pub struct MockImagePreprocessor {
    fail_with: Option<String>,
}

impl MockImagePreprocessor {
    pub fn passthrough() -> Self {
        Self { fail_with: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

impl ImagePreprocessor for MockImagePreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<Vec<u8>, ExtractionError> {
        match &self.fail_with {
            Some(message) => Err(ExtractionError::Decode(message.clone())),
            None => Ok(image_bytes.to_vec()),
        }
    }
}
