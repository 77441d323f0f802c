//! Transaction domain model

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of money for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Apply this kind's sign to a non-negative magnitude
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Income => amount,
            Self::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clearing state reported by the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Posted,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Pending => "pending",
        }
    }

    /// Interpret a bank's free-form status cell; unknown wording yields None
    pub fn from_raw(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        if value.starts_with("pend") || value == "authorized" || value == "authorised" {
            Some(Self::Pending)
        } else if value.starts_with("post")
            || value.starts_with("complete")
            || matches!(value.as_str(), "cleared" | "booked" | "settled")
        {
            Some(Self::Posted)
        } else {
            None
        }
    }
}

/// A successfully parsed CSV row, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    /// 1-indexed position among the data rows below the header. Blank
    /// lines and preamble lines are not counted.
    pub row_number: usize,
    pub date: NaiveDate,
    /// Never empty
    pub description: String,
    /// Always non-negative; direction lives in `kind`
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub merchant: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Original cells, for diagnostics
    pub raw: Vec<String>,
}

impl ParsedRow {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// A row that could not be parsed. Other rows are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Same numbering as [`ParsedRow::row_number`]: data rows only, blank
    /// lines skipped
    pub row_number: usize,
    pub column: Option<String>,
    pub message: String,
    pub raw_value: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.row_number)?;
        if let Some(column) = &self.column {
            write!(f, " [{}]", column)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(raw) = &self.raw_value {
            write!(f, " (value: {:?})", raw)?;
        }
        Ok(())
    }
}

/// A transaction as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub merchant: Option<String>,
    pub status: Option<TransactionStatus>,
    /// Content fingerprint used for re-import protection
    pub fingerprint: String,
    /// Which import batch created this transaction
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the stored form of a parsed row
    pub fn from_parsed(
        account_id: Uuid,
        row: &ParsedRow,
        fingerprint: String,
        batch_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            date: row.date,
            amount: row.amount,
            kind: row.kind,
            description: row.description.clone(),
            merchant: row.merchant.clone(),
            status: row.status,
            fingerprint,
            batch_id: batch_id.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}
