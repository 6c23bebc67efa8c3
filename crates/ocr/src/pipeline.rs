use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use receipta_core::{ExtractionResult, TextBlock};

use crate::extract::Extractor;
use crate::hash;
use crate::payload::{self, DecodeError};
use crate::query::{self, FieldQuery};
use crate::recognizer::{RecognitionError, TextDetector};
use crate::transform::{self, TransformError};

pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_secs(30);

/// One recognition cycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// The image as submitted.
    One,
    /// The colour-inverted image, only when pass one left amount or
    /// transaction id unset.
    Two,
    /// The single pass of query mode.
    Query,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::One => write!(f, "pass one"),
            Pass::Two => write!(f, "pass two"),
            Pass::Query => write!(f, "query pass"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Recognition failed during {pass}: {source}")]
    Recognition {
        pass: Pass,
        #[source]
        source: RecognitionError,
    },
    #[error("Image transform failed during {pass}: {source}")]
    Transform {
        pass: Pass,
        #[source]
        source: TransformError,
    },
}

/// Orchestrates: decode → recognize → extract, and when the amount or the
/// transaction id is still missing, invert → recognize → extract again.
///
/// Values found by pass one are never replaced by pass two. Any recognition
/// or transform failure fails the whole request; no partial result escapes.
pub struct ReceiptPipeline<R: TextDetector> {
    recognizer: R,
    timeout: Duration,
    queries: Vec<FieldQuery>,
}

impl<R: TextDetector> ReceiptPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            timeout: DEFAULT_RECOGNITION_TIMEOUT,
            queries: query::default_queries(),
        }
    }

    /// Upper bound on each call to the recognition service.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_queries(mut self, queries: Vec<FieldQuery>) -> Self {
        self.queries = queries;
        self
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Process the base64 `image` field of a request.
    pub async fn process_payload(&self, payload: &str) -> Result<ExtractionResult, PipelineError> {
        let data = payload::decode_image_payload(payload)?;
        self.process_bytes(&data).await
    }

    /// Process raw image bytes.
    pub async fn process_bytes(&self, data: &[u8]) -> Result<ExtractionResult, PipelineError> {
        let digest = hash::image_digest(data);
        let mut result = ExtractionResult::default();

        // 1. Original image.
        let blocks = self
            .bounded(self.recognizer.detect(data), Pass::One, &digest)
            .await?;
        let filled = result.merge(Extractor::extract(&blocks));
        tracing::info!(image = %digest, "{}: {} blocks, filled {:?}", Pass::One, blocks.len(), filled);

        if !result.missing_critical() {
            return Ok(result);
        }

        // 2. Inverted image, only for what is still unset.
        tracing::info!(image = %digest, "Inverting image, still missing {:?}", result.missing());
        let inverted = invert_off_runtime(data.to_vec()).await.map_err(|source| {
            tracing::warn!(image = %digest, "{}: invert failed: {source}", Pass::Two);
            PipelineError::Transform { pass: Pass::Two, source }
        })?;
        let blocks = self
            .bounded(self.recognizer.detect(&inverted), Pass::Two, &digest)
            .await?;
        let filled = result.merge(Extractor::extract(&blocks));
        tracing::info!(image = %digest, "{}: {} blocks, filled {:?}", Pass::Two, blocks.len(), filled);

        Ok(result)
    }

    /// Query mode over the base64 `image` field of a request.
    pub async fn process_payload_with_queries(
        &self,
        payload: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let data = payload::decode_image_payload(payload)?;
        self.process_bytes_with_queries(&data).await
    }

    /// Query mode: one call asking the configured questions, no retry.
    pub async fn process_bytes_with_queries(
        &self,
        data: &[u8],
    ) -> Result<ExtractionResult, PipelineError> {
        let digest = hash::image_digest(data);
        let blocks = self
            .bounded(
                self.recognizer.analyze_queries(data, &self.queries),
                Pass::Query,
                &digest,
            )
            .await?;
        let result = query::answers_from_blocks(&blocks);
        tracing::info!(image = %digest, "{}: {} blocks, missing {:?}", Pass::Query, blocks.len(), result.missing());
        Ok(result)
    }

    async fn bounded<F>(&self, call: F, pass: Pass, digest: &str) -> Result<Vec<TextBlock>, PipelineError>
    where
        F: Future<Output = Result<Vec<TextBlock>, RecognitionError>>,
    {
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RecognitionError::Timeout(self.timeout)),
        };
        outcome.map_err(|source| {
            tracing::warn!(image = %digest, "{pass}: {source}");
            PipelineError::Recognition { pass, source }
        })
    }
}

/// Decoding and re-encoding a photo is CPU-bound; keep it off the async workers.
async fn invert_off_runtime(data: Vec<u8>) -> Result<Vec<u8>, TransformError> {
    tokio::task::spawn_blocking(move || transform::invert(&data))
        .await
        .map_err(|e| TransformError::Worker(e.to_string()))?
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockDetector;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use receipta_core::{BlockType, Field, Relationship, RelationshipType};
    use std::io::Cursor;

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |x, _| Luma([60 * x as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn complete_receipt() -> Vec<TextBlock> {
        vec![
            TextBlock::word("₹250.00"),
            TextBlock::word("412345678901"),
            TextBlock::line("HDFC Bank"),
            TextBlock::line("12 March 2024, 10:30 AM"),
        ]
    }

    #[tokio::test]
    async fn complete_first_pass_skips_retry() {
        let pipeline = ReceiptPipeline::new(MockDetector::new(complete_receipt()));
        let r = pipeline.process_bytes(&tiny_png()).await.unwrap();

        assert_eq!(pipeline.recognizer().calls(), 1);
        assert_eq!(r.amount.as_deref(), Some("250.00"));
        assert_eq!(r.transaction_id.as_deref(), Some("412345678901"));
        assert_eq!(r.bank_name.as_deref(), Some("HDFC Bank"));
        assert_eq!(r.timestamp.as_deref(), Some("12 March 2024, 10:30 AM"));
    }

    #[tokio::test]
    async fn missing_bank_and_timestamp_do_not_trigger_retry() {
        let pipeline = ReceiptPipeline::new(MockDetector::with_passes(vec![
            vec![TextBlock::word("₹99.00"), TextBlock::word("412345678901")],
            complete_receipt(),
        ]));
        let r = pipeline.process_bytes(&tiny_png()).await.unwrap();

        assert_eq!(pipeline.recognizer().calls(), 1);
        assert_eq!(r.bank_name, None);
        assert_eq!(r.timestamp, None);
    }

    #[tokio::test]
    async fn missing_critical_fields_trigger_inverted_retry() {
        let png = tiny_png();
        let pipeline = ReceiptPipeline::new(MockDetector::with_passes(vec![
            vec![
                TextBlock::line("Axis Bank"),
                TextBlock::line("5 Jan 2024, 9:15 PM"),
            ],
            complete_receipt(),
        ]));
        let r = pipeline.process_bytes(&png).await.unwrap();

        let received = pipeline.recognizer().received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], png);
        assert_eq!(received[1], transform::invert(&png).unwrap());

        assert_eq!(r.amount.as_deref(), Some("250.00"));
        assert_eq!(r.transaction_id.as_deref(), Some("412345678901"));
        // Pass-one values survive the merge.
        assert_eq!(r.bank_name.as_deref(), Some("Axis Bank"));
        assert_eq!(r.timestamp.as_deref(), Some("5 Jan 2024, 9:15 PM"));
    }

    #[tokio::test]
    async fn second_pass_runs_at_most_once() {
        let pipeline = ReceiptPipeline::new(MockDetector::new(vec![TextBlock::line("blurry")]));
        let r = pipeline.process_bytes(&tiny_png()).await.unwrap();

        assert_eq!(pipeline.recognizer().calls(), 2);
        assert_eq!(r, ExtractionResult::default());
    }

    #[tokio::test]
    async fn pipeline_is_idempotent() {
        let run = || async {
            let pipeline = ReceiptPipeline::new(MockDetector::with_passes(vec![
                vec![TextBlock::word("₹10.00")],
                complete_receipt(),
            ]));
            pipeline.process_bytes(&tiny_png()).await.unwrap()
        };
        assert_eq!(run().await, run().await);
    }

    #[tokio::test]
    async fn first_pass_failure_fails_request() {
        let pipeline = ReceiptPipeline::new(MockDetector::failing("access denied"));
        let err = pipeline.process_bytes(&tiny_png()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Recognition { pass: Pass::One, .. }));
        assert!(err.to_string().contains("access denied"));
    }

    #[tokio::test]
    async fn second_pass_failure_discards_partial_result() {
        let pipeline = ReceiptPipeline::new(
            MockDetector::new(vec![TextBlock::word("₹10.00")]).fail_from_call(1, "throttled"),
        );
        let err = pipeline.process_bytes(&tiny_png()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Recognition { pass: Pass::Two, .. }));
    }

    #[tokio::test]
    async fn invert_failure_fails_request() {
        let pipeline = ReceiptPipeline::new(MockDetector::new(vec![]));
        let err = pipeline.process_bytes(b"not an image").await.unwrap_err();
        assert!(matches!(err, PipelineError::Transform { pass: Pass::Two, .. }));
        assert_eq!(pipeline.recognizer().calls(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn invert_runs_on_blocking_pool() {
        let png = tiny_png();
        let (off_runtime, ticked) = tokio::join!(invert_off_runtime(png.clone()), async {
            tokio::task::yield_now().await;
            true
        });
        assert!(ticked);
        assert_eq!(off_runtime.unwrap(), transform::invert(&png).unwrap());

        let err = invert_off_runtime(b"junk".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransformError::Load(_)));
    }

    struct StalledDetector;

    impl TextDetector for StalledDetector {
        fn detect(
            &self,
            _image_bytes: &[u8],
        ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, RecognitionError>(vec![])
            }
        }

        fn analyze_queries(
            &self,
            image_bytes: &[u8],
            _queries: &[FieldQuery],
        ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
            self.detect(image_bytes)
        }
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let pipeline = ReceiptPipeline::new(StalledDetector).with_timeout(Duration::from_millis(20));
        let err = pipeline.process_bytes(&tiny_png()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Recognition { pass: Pass::One, source: RecognitionError::Timeout(_) }
        ));
    }

    #[tokio::test]
    async fn payload_decode_error_skips_recognition() {
        let pipeline = ReceiptPipeline::new(MockDetector::new(complete_receipt()));
        let err = pipeline.process_payload("%%%").await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert_eq!(pipeline.recognizer().calls(), 0);
    }

    #[tokio::test]
    async fn payload_with_data_url_header() {
        let pipeline = ReceiptPipeline::new(MockDetector::new(complete_receipt()));
        let payload = format!("data:image/png;base64,{}", STANDARD.encode(tiny_png()));
        let r = pipeline.process_payload(&payload).await.unwrap();
        assert_eq!(r.transaction_id.as_deref(), Some("412345678901"));
    }

    #[tokio::test]
    async fn query_mode_single_pass() {
        let blocks = vec![
            TextBlock {
                block_type: BlockType::Query,
                text: None,
                id: Some("q1".into()),
                relationships: vec![Relationship {
                    kind: RelationshipType::Answer,
                    ids: vec!["r1".into()],
                }],
                query: Some(receipta_core::BlockQuery {
                    text: None,
                    alias: Some("amount".into()),
                }),
            },
            TextBlock { id: Some("r1".into()), ..TextBlock::new(BlockType::QueryResult, "₹75") },
        ];
        let pipeline = ReceiptPipeline::new(MockDetector::new(blocks));
        let r = pipeline.process_bytes_with_queries(&tiny_png()).await.unwrap();

        assert_eq!(pipeline.recognizer().calls(), 1);
        assert_eq!(r.get(Field::Amount), Some("₹75"));
        assert_eq!(r.missing(), vec![Field::TransactionId, Field::BankName, Field::Timestamp]);
    }
}
