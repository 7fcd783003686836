use crate::transactions::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a categorization decision came from.
///
/// Closed set on purpose: supersession and filtering key off this tag, and an
/// open string would let a typo silently corrupt both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Entered or confirmed by the user.
    User,
    /// Produced by a matching rule or an unattended model run.
    Rule,
    /// Suggested by an LLM enrichment pass.
    Llm,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Source::User => "user",
            Source::Rule => "rule",
            Source::Llm => "llm",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sequence number assigned by the store at append time, starting at 1.
/// Doubles as the insertion-order tie breaker for supersession.
#[derive(
    Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Default,
)]
pub struct EventId(pub u64);

/// One categorization decision, as recorded in the append-only log.
///
/// Events are immutable facts: once appended they are never edited or
/// deleted.  Re-categorizing a transaction appends a new event whose
/// `previous_category` records what it replaced; training later keeps only
/// the most recent event per transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationEvent {
    pub transaction_id: TransactionId,
    pub description: String,
    pub amount: Decimal,
    pub account: AccountId,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub previous_category: Option<String>,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
}

impl CategorizationEvent {
    /// The training label: `category` or `category:subcategory`.
    pub fn label(&self) -> String {
        match &self.subcategory {
            None => self.category.clone(),
            Some(sub) => format!("{}:{}", self.category, sub),
        }
    }
}

/// Split a training label back into (category, subcategory).
pub fn split_label(label: &str) -> (String, Option<String>) {
    match label.split_once(':') {
        None => (label.to_string(), None),
        Some((cat, sub)) => (cat.to_string(), Some(sub.to_string())),
    }
}

/// Narrows a query over the event log.  All criteria are optional and
/// combine with AND; the default filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub account: Option<AccountId>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
