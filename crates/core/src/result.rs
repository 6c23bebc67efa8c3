use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four fields pulled off a payment receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Amount,
    TransactionId,
    BankName,
    Timestamp,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Amount,
        Field::TransactionId,
        Field::BankName,
        Field::Timestamp,
    ];

    /// Fields whose absence after the first pass warrants a second pass.
    pub const CRITICAL: [Field; 2] = [Field::Amount, Field::TransactionId];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Amount => "amount",
            Field::TransactionId => "transaction_id",
            Field::BankName => "bank_name",
            Field::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amount" => Ok(Field::Amount),
            "transaction_id" => Ok(Field::TransactionId),
            "bank_name" => Ok(Field::BankName),
            "timestamp" => Ok(Field::Timestamp),
            other => Err(format!("Unknown field: '{other}'")),
        }
    }
}

/// The accumulating output of an extraction request.
///
/// A field, once holding a non-empty value, is never overwritten: later
/// passes can only fill what is still unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub amount: Option<String>,
    pub transaction_id: Option<String>,
    pub bank_name: Option<String>,
    pub timestamp: Option<String>,
}

impl ExtractionResult {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.slot(field).as_deref().filter(|v| !v.is_empty())
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Write `value` into `field` only if the field is unset and the value is
    /// non-empty. Returns whether the field was filled.
    pub fn fill(&mut self, field: Field, value: Option<String>) -> bool {
        if self.is_set(field) {
            return false;
        }
        match value.filter(|v| !v.is_empty()) {
            Some(v) => {
                *self.slot_mut(field) = Some(v);
                true
            }
            None => false,
        }
    }

    /// Merge a later pass into this one. Returns the fields that were filled.
    pub fn merge(&mut self, later: ExtractionResult) -> Vec<Field> {
        let ExtractionResult { amount, transaction_id, bank_name, timestamp } = later;
        [
            (Field::Amount, amount),
            (Field::TransactionId, transaction_id),
            (Field::BankName, bank_name),
            (Field::Timestamp, timestamp),
        ]
        .into_iter()
        .filter_map(|(field, value)| self.fill(field, value).then_some(field))
        .collect()
    }

    pub fn missing(&self) -> Vec<Field> {
        Field::ALL.into_iter().filter(|f| !self.is_set(*f)).collect()
    }

    /// True when the amount or the transaction id is still unset.
    pub fn missing_critical(&self) -> bool {
        Field::CRITICAL.iter().any(|f| !self.is_set(*f))
    }

    fn slot(&self, field: Field) -> &Option<String> {
        match field {
            Field::Amount => &self.amount,
            Field::TransactionId => &self.transaction_id,
            Field::BankName => &self.bank_name,
            Field::Timestamp => &self.timestamp,
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Amount => &mut self.amount,
            Field::TransactionId => &mut self.transaction_id,
            Field::BankName => &mut self.bank_name,
            Field::Timestamp => &mut self.timestamp,
        }
    }
}
