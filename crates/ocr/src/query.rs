//! Query mode: instead of pattern-matching raw text, ask the recognition
//! service one natural-language question per field and read back its answers.

use std::collections::HashMap;

use receipta_core::{BlockType, ExtractionResult, Field, RelationshipType, TextBlock};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldQuery {
    pub text: String,
    /// Field name the answers are filed under.
    pub alias: String,
    pub pages: Vec<String>,
}

impl FieldQuery {
    /// A question about `field`, asked of the first page only.
    pub fn new(field: Field, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alias: field.to_string(),
            pages: vec!["1".to_string()],
        }
    }
}

pub fn default_queries() -> Vec<FieldQuery> {
    vec![
        FieldQuery::new(Field::Amount, "What is the transaction amount?"),
        FieldQuery::new(Field::TransactionId, "What is the transaction ID?"),
        FieldQuery::new(
            Field::BankName,
            "What bank processed this transaction? Include any text that mentions 'bank'.",
        ),
        FieldQuery::new(
            Field::Timestamp,
            "Please provide the date and time when the transaction occurred.",
        ),
    ]
}

/// Resolve QUERY → ANSWER → QUERY_RESULT links into a result record.
///
/// Several answers to one field are joined with newlines, in block order.
/// Queries with an unknown alias and answer ids with no matching result
/// block are skipped.
pub fn answers_from_blocks(blocks: &[TextBlock]) -> ExtractionResult {
    let results: HashMap<&str, &str> = blocks
        .iter()
        .filter(|b| b.block_type == BlockType::QueryResult)
        .filter_map(|b| Some((b.id.as_deref()?, b.text.as_deref()?)))
        .collect();

    let mut answers: HashMap<Field, Vec<&str>> = HashMap::new();
    for block in blocks.iter().filter(|b| b.block_type == BlockType::Query) {
        let Some(alias) = block.query.as_ref().and_then(|q| q.alias.as_deref()) else {
            continue;
        };
        let field = match alias.parse::<Field>() {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!("Skipping query block: {e}");
                continue;
            }
        };
        let texts = block
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::Answer)
            .flat_map(|r| r.ids.iter())
            .filter_map(|id| results.get(id.as_str()).copied());
        answers.entry(field).or_default().extend(texts);
    }

    let mut out = ExtractionResult::default();
    for field in Field::ALL {
        let joined = answers.get(&field).map(|v| v.join("\n"));
        out.fill(field, joined);
    }
    out
}
