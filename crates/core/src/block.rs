use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of unit returned by the text-recognition service.
///
/// Only `Word` and `Line` feed the field extractors; `Query` and `QueryResult`
/// belong to query mode. Anything else the service emits (pages, key/value
/// sets, ...) is kept as `Other` so a response never fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Word,
    Line,
    Query,
    QueryResult,
    #[serde(other)]
    Other,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Word => write!(f, "WORD"),
            BlockType::Line => write!(f, "LINE"),
            BlockType::Query => write!(f, "QUERY"),
            BlockType::QueryResult => write!(f, "QUERY_RESULT"),
            BlockType::Other => write!(f, "OTHER"),
        }
    }
}

impl From<&str> for BlockType {
    fn from(s: &str) -> Self {
        match s {
            "WORD" => BlockType::Word,
            "LINE" => BlockType::Line,
            "QUERY" => BlockType::Query,
            "QUERY_RESULT" => BlockType::QueryResult,
            _ => BlockType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Answer,
    Child,
    #[serde(other)]
    Other,
}

impl From<&str> for RelationshipType {
    fn from(s: &str) -> Self {
        match s {
            "ANSWER" => RelationshipType::Answer,
            "CHILD" => RelationshipType::Child,
            _ => RelationshipType::Other,
        }
    }
}

/// Typed link from one block to others, by block id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// The question attached to a `QUERY` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockQuery {
    pub text: Option<String>,
    pub alias: Option<String>,
}

/// One unit of OCR output. Field names follow the service's JSON so a raw
/// response body deserializes straight into `Vec<TextBlock>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextBlock {
    pub block_type: BlockType,
    pub text: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub query: Option<BlockQuery>,
}

impl TextBlock {
    pub fn new(block_type: BlockType, text: impl Into<String>) -> Self {
        Self {
            block_type,
            text: Some(text.into()),
            id: None,
            relationships: vec![],
            query: None,
        }
    }

    pub fn word(text: impl Into<String>) -> Self {
        Self::new(BlockType::Word, text)
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self::new(BlockType::Line, text)
    }

    /// Text of this block if it is of the given type and carries any text.
    pub fn text_of(&self, block_type: BlockType) -> Option<&str> {
        if self.block_type == block_type {
            self.text.as_deref()
        } else {
            None
        }
    }
}
