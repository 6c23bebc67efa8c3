use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use receipta_core::ExtractionResult;
use receipta_ocr::{PipelineError, ReceiptPipeline, TextDetector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Instrument;
use uuid::Uuid;

/// Message returned for faults whose detail stays in the logs.
pub const GENERIC_FAILURE: &str = "Something went wrong";

#[derive(Debug, Deserialize)]
pub struct OcrRequest {
    /// Base64 image, optionally with a `data:image/...;base64,` header.
    pub image: Option<String>,
}

/// `{"status": "success", "data": {...}}` or `{"status": "failure", "data": "<message>"}`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum OcrResponse {
    Success(ExtractionResult),
    Failure(String),
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Patterns,
    Queries,
}

/// Bodies over `max_body_bytes` are rejected by the JSON extractor, so they
/// still get the failure envelope.
pub fn router<R>(pipeline: Arc<ReceiptPipeline<R>>, max_body_bytes: usize) -> Router
where
    R: TextDetector + 'static,
{
    Router::new()
        .route("/ping", get(ping))
        .route("/ocr", post(ocr::<R>))
        .route("/ocr/query", post(ocr_query::<R>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "result": "ok" }))
}

async fn ocr<R: TextDetector + 'static>(
    State(pipeline): State<Arc<ReceiptPipeline<R>>>,
    payload: Result<Json<OcrRequest>, JsonRejection>,
) -> Json<OcrResponse> {
    Json(handle(&pipeline, payload, Mode::Patterns).await)
}

async fn ocr_query<R: TextDetector + 'static>(
    State(pipeline): State<Arc<ReceiptPipeline<R>>>,
    payload: Result<Json<OcrRequest>, JsonRejection>,
) -> Json<OcrResponse> {
    Json(handle(&pipeline, payload, Mode::Queries).await)
}

async fn handle<R: TextDetector>(
    pipeline: &ReceiptPipeline<R>,
    payload: Result<Json<OcrRequest>, JsonRejection>,
    mode: Mode,
) -> OcrResponse {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("ocr_request", %request_id, ?mode);

    async move {
        let image = match payload {
            Ok(Json(OcrRequest { image: Some(image) })) => image,
            Ok(_) => {
                tracing::warn!("Request without an image field");
                return OcrResponse::Failure("Missing `image` field".to_string());
            }
            Err(rejection) => {
                tracing::warn!("Rejected request body: {rejection}");
                return OcrResponse::Failure(rejection.body_text());
            }
        };

        let outcome = match mode {
            Mode::Patterns => pipeline.process_payload(&image).await,
            Mode::Queries => pipeline.process_payload_with_queries(&image).await,
        };

        match outcome {
            Ok(result) => {
                tracing::info!("Extraction finished, missing {:?}", result.missing());
                OcrResponse::Success(result)
            }
            Err(e) => {
                tracing::error!("Extraction failed: {e}");
                OcrResponse::Failure(client_message(&e))
            }
        }
    }
    .instrument(span)
    .await
}

fn client_message(err: &PipelineError) -> String {
    match err {
        PipelineError::Decode(e) => e.to_string(),
        PipelineError::Recognition { .. } | PipelineError::Transform { .. } => {
            GENERIC_FAILURE.to_string()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use receipta_ocr::{MockDetector, TextBlock};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn tiny_png_b64() -> String {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([200u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(buf)
    }

    fn app(detector: MockDetector) -> Router {
        router(Arc::new(ReceiptPipeline::new(detector)), 1 << 20)
    }

    async fn post_json(app: Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn ping_acknowledges() {
        let resp = app(MockDetector::default())
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v, json!({ "result": "ok" }));
    }

    #[tokio::test]
    async fn ocr_success_envelope() {
        let detector = MockDetector::new(vec![
            TextBlock::word("₹1,250.00"),
            TextBlock::word("412345678901"),
            TextBlock::line("Kotak Mahindra Bank"),
        ]);
        let body = json!({ "image": format!("data:image/png;base64,{}", tiny_png_b64()) });
        let (status, v) = post_json(app(detector), "/ocr", body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["status"], "success");
        assert_eq!(v["data"]["amount"], "1250.00");
        assert_eq!(v["data"]["transaction_id"], "412345678901");
        assert_eq!(v["data"]["bank_name"], "Kotak Mahindra Bank");
        assert!(v["data"]["timestamp"].is_null());
    }

    #[tokio::test]
    async fn recognition_failure_hides_detail() {
        let body = json!({ "image": tiny_png_b64() });
        let (_, v) = post_json(app(MockDetector::failing("AccessDenied: secret-arn")), "/ocr", body.to_string()).await;
        assert_eq!(v, json!({ "status": "failure", "data": GENERIC_FAILURE }));
    }

    #[tokio::test]
    async fn decode_failure_is_reported() {
        let body = json!({ "image": "!!!not-base64!!!" });
        let (_, v) = post_json(app(MockDetector::default()), "/ocr", body.to_string()).await;
        assert_eq!(v["status"], "failure");
        assert!(v["data"].as_str().unwrap().contains("base64"));
    }

    #[tokio::test]
    async fn missing_image_field_fails() {
        let (_, v) = post_json(app(MockDetector::default()), "/ocr", "{}".to_string()).await;
        assert_eq!(v["status"], "failure");
        assert_eq!(v["data"], "Missing `image` field");
    }

    #[tokio::test]
    async fn malformed_json_fails() {
        let (status, v) = post_json(app(MockDetector::default()), "/ocr", "{\"image\":".to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["status"], "failure");
    }

    #[tokio::test]
    async fn oversized_body_gets_failure_envelope() {
        let app = router(Arc::new(ReceiptPipeline::new(MockDetector::default())), 64);
        let body = json!({ "image": "A".repeat(200) }).to_string();
        let len = body.len();
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ocr")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::CONTENT_LENGTH, len)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["status"], "failure");
        assert!(v["data"].as_str().unwrap().contains("length limit"));
    }

    #[tokio::test]
    async fn query_route_uses_query_mode() {
        let blocks = vec![
            TextBlock {
                block_type: receipta_ocr::BlockType::Query,
                text: None,
                id: Some("q1".into()),
                relationships: vec![receipta_core::Relationship {
                    kind: receipta_core::RelationshipType::Answer,
                    ids: vec!["r1".into()],
                }],
                query: Some(receipta_core::BlockQuery {
                    text: None,
                    alias: Some("bank_name".into()),
                }),
            },
            TextBlock {
                id: Some("r1".into()),
                ..TextBlock::new(receipta_ocr::BlockType::QueryResult, "Punjab National Bank")
            },
        ];
        let body = json!({ "image": tiny_png_b64() });
        let (_, v) = post_json(app(MockDetector::new(blocks)), "/ocr/query", body.to_string()).await;
        assert_eq!(v["status"], "success");
        assert_eq!(v["data"]["bank_name"], "Punjab National Bank");
        assert!(v["data"]["amount"].is_null());
    }
}
