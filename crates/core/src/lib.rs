pub mod amount;
pub mod block;
pub mod result;

pub use amount::normalize_amount;
pub use block::{BlockQuery, BlockType, Relationship, RelationshipType, TextBlock};
pub use result::{ExtractionResult, Field};
