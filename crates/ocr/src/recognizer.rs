use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use receipta_core::TextBlock;

use crate::query::FieldQuery;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Recognition service error: {0}")]
    Service(String),
    #[error("Invalid recognition request: {0}")]
    InvalidRequest(String),
    #[error("Recognition service did not answer within {0:?}")]
    Timeout(Duration),
}

/// Abstraction over the document-text-recognition service.
///
/// Implementations accept raw PNG/JPEG image bytes and return the recognized
/// blocks in service order. One call is one outbound request: no caching and
/// no retries at this layer.
pub trait TextDetector: Send + Sync {
    /// Plain text detection: WORD and LINE blocks (plus page furniture).
    fn detect(
        &self,
        image_bytes: &[u8],
    ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send;

    /// Query mode: ask one question per field and return QUERY and
    /// QUERY_RESULT blocks alongside the text blocks.
    fn analyze_queries(
        &self,
        image_bytes: &[u8],
        queries: &[FieldQuery],
    ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Replays scripted block lists, one per call, so the two-pass pipeline can
/// be exercised without a live service. The last script repeats once the
/// list is exhausted.
#[derive(Debug, Default)]
pub struct MockDetector {
    passes: Vec<Vec<TextBlock>>,
    fail_from: Option<(usize, String)>,
    calls: AtomicUsize,
    received: Mutex<Vec<Vec<u8>>>,
}

impl MockDetector {
    /// Returns the same blocks for every call.
    pub fn new(blocks: Vec<TextBlock>) -> Self {
        Self::with_passes(vec![blocks])
    }

    pub fn with_passes(passes: Vec<Vec<TextBlock>>) -> Self {
        Self { passes, ..Default::default() }
    }

    /// Every call fails with a service error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::default().fail_from_call(0, message)
    }

    /// Calls numbered `call` (zero-based) and later fail with a service error.
    pub fn fail_from_call(mut self, call: usize, message: impl Into<String>) -> Self {
        self.fail_from = Some((call, message.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Image bytes passed to each call, in order.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn respond(&self, image_bytes: &[u8]) -> Result<Vec<TextBlock>, RecognitionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(image_bytes.to_vec());
        }
        if let Some((from, message)) = &self.fail_from {
            if call >= *from {
                return Err(RecognitionError::Service(message.clone()));
            }
        }
        Ok(self
            .passes
            .get(call)
            .or_else(|| self.passes.last())
            .cloned()
            .unwrap_or_default())
    }
}

impl TextDetector for MockDetector {
    fn detect(
        &self,
        image_bytes: &[u8],
    ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
        std::future::ready(self.respond(image_bytes))
    }

    fn analyze_queries(
        &self,
        image_bytes: &[u8],
        _queries: &[FieldQuery],
    ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
        std::future::ready(self.respond(image_bytes))
    }
}

// ── AWS Textract backend (optional, gated behind `textract` feature) ──────────

#[cfg(feature = "textract")]
pub mod textract_backend {
    use super::{RecognitionError, TextDetector};
    use crate::query::FieldQuery;
    use aws_sdk_textract::config::Region;
    use aws_sdk_textract::error::DisplayErrorContext;
    use aws_sdk_textract::primitives::Blob;
    use aws_sdk_textract::types::{Block, Document, FeatureType, QueriesConfig, Query};
    use aws_sdk_textract::Client;
    use receipta_core::{BlockQuery, BlockType, Relationship, RelationshipType, TextBlock};
    use std::future::Future;

    /// Textract `DetectDocumentText` / `AnalyzeDocument` client.
    #[derive(Clone)]
    pub struct TextractDetector {
        client: Client,
    }

    impl TextractDetector {
        pub fn new(client: Client) -> Self {
            Self { client }
        }

        /// Build a client from the standard AWS credential chain, optionally
        /// pinning the region.
        pub async fn from_env(region: Option<String>) -> Self {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = region {
                loader = loader.region(Region::new(region));
            }
            let config = loader.load().await;
            Self::new(Client::new(&config))
        }
    }

    impl TextDetector for TextractDetector {
        fn detect(
            &self,
            image_bytes: &[u8],
        ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
            let request = self
                .client
                .detect_document_text()
                .document(document(image_bytes));
            async move {
                let output = request
                    .send()
                    .await
                    .map_err(|e| RecognitionError::Service(DisplayErrorContext(&e).to_string()))?;
                Ok::<_, RecognitionError>(convert_blocks(output.blocks()))
            }
        }

        fn analyze_queries(
            &self,
            image_bytes: &[u8],
            queries: &[FieldQuery],
        ) -> impl Future<Output = Result<Vec<TextBlock>, RecognitionError>> + Send {
            let config = queries_config(queries);
            let request = self
                .client
                .analyze_document()
                .document(document(image_bytes))
                .feature_types(FeatureType::Queries);
            async move {
                let output = request
                    .queries_config(config?)
                    .send()
                    .await
                    .map_err(|e| RecognitionError::Service(DisplayErrorContext(&e).to_string()))?;
                Ok::<_, RecognitionError>(convert_blocks(output.blocks()))
            }
        }
    }

    fn document(image_bytes: &[u8]) -> Document {
        Document::builder()
            .bytes(Blob::new(image_bytes.to_vec()))
            .build()
    }

    fn queries_config(queries: &[FieldQuery]) -> Result<QueriesConfig, RecognitionError> {
        let mut builder = QueriesConfig::builder();
        for q in queries {
            let query = Query::builder()
                .text(&q.text)
                .alias(&q.alias)
                .set_pages(Some(q.pages.clone()))
                .build()
                .map_err(|e| RecognitionError::InvalidRequest(e.to_string()))?;
            builder = builder.queries(query);
        }
        builder
            .build()
            .map_err(|e| RecognitionError::InvalidRequest(e.to_string()))
    }

    /// Blocks without a type cannot be routed to any extractor and are dropped.
    fn convert_blocks(blocks: &[Block]) -> Vec<TextBlock> {
        blocks
            .iter()
            .filter_map(|b| {
                let block_type = BlockType::from(b.block_type()?.as_str());
                Some(TextBlock {
                    block_type,
                    text: b.text().map(str::to_string),
                    id: b.id().map(str::to_string),
                    relationships: b
                        .relationships()
                        .iter()
                        .filter_map(|r| {
                            Some(Relationship {
                                kind: RelationshipType::from(r.r#type()?.as_str()),
                                ids: r.ids().to_vec(),
                            })
                        })
                        .collect(),
                    query: b.query().map(|q| BlockQuery {
                        text: Some(q.text().to_string()),
                        alias: q.alias().map(str::to_string),
                    }),
                })
            })
            .collect()
    }

}
