use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the upstream bank-export pipeline.  Opaque to us:
/// we only rely on it being stable across runs, so that re-categorizations
/// of the same transaction can supersede one another.
#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Eq, PartialEq, Hash, Clone, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bank transaction, as produced by the surrounding ledger.
///
/// This is read-only data for the categorization pipeline: we never edit the
/// ledger directly, we only emit categorization events that the ledger
/// consumes downstream.  Amounts are signed and assumed to be normalized to
/// one currency per account by the importer; descriptions are the raw
/// statement text ("SPOTIFY PREMIUM", "LOBLAWS #4", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub account: AccountId,

    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

impl Transaction {
    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }
}
