pub mod extract;
pub mod hash;
pub mod payload;
pub mod pipeline;
pub mod query;
pub mod recognizer;
pub mod transform;

pub use extract::Extractor;
pub use hash::{sha256_bytes, to_hex};
pub use payload::{decode_image_payload, DecodeError};
pub use pipeline::{Pass, PipelineError, ReceiptPipeline, DEFAULT_RECOGNITION_TIMEOUT};
pub use query::{answers_from_blocks, default_queries, FieldQuery};
pub use receipta_core::{BlockType, ExtractionResult, Field, TextBlock};
pub use recognizer::{MockDetector, RecognitionError, TextDetector};
pub use transform::{invert, to_grayscale, TransformError};
