//! Router for the OCR service. Routes are nested under `/api/`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// The body limit applies to every route; the OCR upload is the only one
/// that accepts a body.
pub fn ocr_api_router(ctx: ApiContext) -> Router {
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/documents/ocr", post(endpoints::ocr::extract))
        .layer(DefaultBodyLimit::max(ctx.body_limit))
        .with_state(ctx);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::pipeline::extraction::diagnosis_group::{
        AllowedCodeSet, DiagnosisGroupExtractor, DEFAULT_GROUP_MARKER,
    };
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::extraction::orchestrator::DocumentPipeline;
    use crate::pipeline::extraction::pdf::MockPdfTextLayer;
    use crate::pipeline::extraction::preprocess::MockImagePreprocessor;
    use crate::pipeline::extraction::rasterize::{MockPageConverter, PdfRasterizer};

    fn test_router(ocr_text: &str, body_limit: usize) -> Router {
        let pipeline = DocumentPipeline::new(
            Box::new(MockOcrEngine::new(ocr_text)),
            Box::new(MockPdfTextLayer::empty()),
            PdfRasterizer::new(Box::new(MockPageConverter::new(2))),
            DiagnosisGroupExtractor::new(AllowedCodeSet::default(), DEFAULT_GROUP_MARKER)
                .unwrap(),
        )
        .with_preprocessor(Box::new(MockImagePreprocessor::passthrough()));
        ocr_api_router(ApiContext::new(pipeline, body_limit))
    }

    fn png_data_url() -> String {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(cursor.into_inner()))
    }

    fn post_json(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/documents/ocr")
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_router("", 1024 * 1024);
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["language"], "deu");
    }

    #[tokio::test]
    async fn ocr_returns_one_result_per_file_in_order() {
        let app = test_router("Diagnosegruppe: SB1", 1024 * 1024);
        let body = json!({"files": [
            {"name": "scan.pdf", "mime": "application/pdf",
             "data": STANDARD.encode(b"%PDF-1.4 scanned")},
            {"name": "kaputt.png", "mime": "image/png", "data": "@@@"},
            {"name": "foto.png", "mimeType": "image/png", "data": png_data_url()},
        ]});

        let response = app.oneshot(post_json(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);

        assert_eq!(results[0]["name"], "scan.pdf");
        assert_eq!(results[0]["diagnosisGroup"], "SB1");
        assert_eq!(results[0]["source"], "pdf");
        assert_eq!(results[0]["hadTextLayer"], false);

        assert_eq!(results[1]["name"], "kaputt.png");
        assert!(results[1]["error"].is_string());
        assert!(results[1].get("diagnosisGroup").is_none());

        assert_eq!(results[2]["name"], "foto.png");
        assert_eq!(results[2]["diagnosisGroup"], "SB1");
        assert_eq!(results[2]["source"], "image");
        assert!(results[2].get("hadTextLayer").is_none());
    }

    #[tokio::test]
    async fn miss_serializes_null_group() {
        let app = test_router("nichts erkannt", 1024 * 1024);
        let body = json!({"files": [{"name": "a.png", "mime": "image/png", "data": png_data_url()}]});

        let json = json_body(app.oneshot(post_json(&body)).await.unwrap()).await;

        assert!(json["results"][0]["diagnosisGroup"].is_null());
        assert!(json["results"][0].get("error").is_none());
    }

    #[tokio::test]
    async fn long_s_in_ocr_text_still_returns_every_result() {
        let app = test_router("Diagnosegruppe: \u{17F}\u{17F}1 weiter", 1024 * 1024);
        let file = |name: &str| json!({"name": name, "mime": "image/png", "data": png_data_url()});
        let body = json!({"files": [file("a.png"), file("b.png"), file("c.png")]});

        let response = app.oneshot(post_json(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r["diagnosisGroup"].is_null() && r.get("error").is_none()));
    }

    #[tokio::test]
    async fn missing_files_is_400() {
        let app = test_router("", 1024 * 1024);

        let response = app.oneshot(post_json(&json!({"files": []}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "MISSING_FILES");
    }

    #[tokio::test]
    async fn invalid_file_object_is_400() {
        let app = test_router("", 1024 * 1024);
        let body = json!({"files": [{"name": "a.pdf", "data": "JVBERi0="}]});

        let response = app.oneshot(post_json(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "INVALID_FILE_OBJECT");
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let app = test_router("", 1024 * 1024);
        let req = Request::builder()
            .method("POST")
            .uri("/api/documents/ocr")
            .header("Content-Type", "application/json")
            .body(Body::from("{\"files\": ["))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let app = test_router("", 256);
        let body = json!({"files": [
            {"name": "big.png", "mime": "image/png", "data": "A".repeat(4096)},
        ]});

        let response = app.oneshot(post_json(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = test_router("", 1024);
        let req = Request::builder()
            .uri("/api/unknown")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
