use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::extraction::types::ExtractionOutcome;
use crate::pipeline::import::parse_batch;

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub results: Vec<ExtractionOutcome>,
}

/// `POST /api/documents/ocr`: diagnosis group for each uploaded file.
///
/// Envelope problems reject the whole request with 400. Problems with
/// individual files come back as `{ name, error }` entries in `results`.
pub async fn extract(
    State(ctx): State<ApiContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<OcrResponse>, ApiError> {
    let Json(body) = body?;
    let files = parse_batch(&body)?;

    tracing::info!(files = files.len(), "OCR request accepted");

    // OCR and rasterization block; keep them off the async workers
    let pipeline = ctx.pipeline.clone();
    let results = tokio::task::spawn_blocking(move || pipeline.process_encoded(&files))
        .await
        .map_err(|e| ApiError::Internal(format!("OCR worker failed: {e}")))?;

    Ok(Json(OcrResponse { results }))
}
