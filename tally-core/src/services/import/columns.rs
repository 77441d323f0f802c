//! Column auto-detection
//!
//! Best-effort guess of which header carries which field. Detection is
//! advisory: the result is a draft the caller may override, and it never
//! fails.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{AmountMode, ColumnMappingDraft};

use super::dates;

const DATE_PATTERNS: &[&str] = &[
    "transaction date",
    "trans date",
    "txn date",
    "posting date",
    "posted date",
    "booking date",
    "date",
    "datum",
];
const DEBIT_PATTERNS: &[&str] = &["debit", "withdrawal", "money out", "paid out", "outflow"];
const CREDIT_PATTERNS: &[&str] = &["credit", "deposit", "money in", "paid in", "inflow"];
const AMOUNT_PATTERNS: &[&str] = &["amount", "amt", "value", "total", "betrag"];
const DESCRIPTION_PATTERNS: &[&str] = &[
    "description",
    "desc",
    "memo",
    "narrative",
    "narration",
    "details",
    "particulars",
    "reference",
];
const MERCHANT_PATTERNS: &[&str] = &["merchant", "payee", "vendor", "counterparty"];
const STATUS_PATTERNS: &[&str] = &["status", "pending", "posted", "cleared"];

/// How many leading records are searched for a header line
const HEADER_SEARCH_DEPTH: usize = 20;

/// A date keyword as a whole word, or closing a compound such as
/// "Buchungsdatum". "Update" and "Mandate" do not match.
static DATE_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^\p{L}])(?:dates?|datum)(?:$|[^\p{L}])|datum$")
        .expect("date keyword pattern is static and valid")
});

/// A cell that reads as an amount rather than a column name
static NUMERIC_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+(]?\s*[$€£¥]?\s*\d[\d.,'\s]*\)?-?$")
        .expect("numeric cell pattern is static and valid")
});

/// Tracks which headers have already been given a role
struct Claims<'a> {
    headers: &'a [String],
    lowered: Vec<String>,
    claimed: Vec<bool>,
}

impl<'a> Claims<'a> {
    fn new(headers: &'a [String]) -> Self {
        Self {
            headers,
            lowered: headers.iter().map(|h| h.trim().to_lowercase()).collect(),
            claimed: vec![false; headers.len()],
        }
    }

    /// Try candidates in order; the first unclaimed header containing one wins
    fn claim(&mut self, patterns: &[&str]) -> Option<String> {
        for pattern in patterns {
            let found = self
                .lowered
                .iter()
                .enumerate()
                .find(|(i, h)| !self.claimed[*i] && !h.is_empty() && h.contains(pattern))
                .map(|(i, _)| i);
            if let Some(i) = found {
                self.claimed[i] = true;
                return Some(self.headers[i].trim().to_string());
            }
        }
        None
    }
}

/// Guess a column mapping from header names.
///
/// Roles are resolved in a fixed order (date, debit, credit, amount,
/// description, merchant, status) and a header serves at most one role.
/// The date format is not set here; it needs sample values.
pub fn detect_columns(headers: &[String]) -> ColumnMappingDraft {
    let mut claims = Claims::new(headers);

    let date = claims.claim(DATE_PATTERNS);
    let debit = claims.claim(DEBIT_PATTERNS);
    let credit = claims.claim(CREDIT_PATTERNS);
    let amount = claims.claim(AMOUNT_PATTERNS);
    let description = claims.claim(DESCRIPTION_PATTERNS);
    let merchant = claims.claim(MERCHANT_PATTERNS);
    let status = claims.claim(STATUS_PATTERNS);

    let split = amount.is_none() && debit.is_some() && credit.is_some();
    let (amount_mode, amount_column, debit_column, credit_column) = if split {
        (AmountMode::Split, None, debit, credit)
    } else {
        (AmountMode::Single, amount, None, None)
    };

    ColumnMappingDraft {
        date_column: date,
        amount_mode: Some(amount_mode),
        amount_column,
        debit_column,
        credit_column,
        description_column: description,
        merchant_column: merchant,
        status_column: status,
        ..Default::default()
    }
}

/// Find the header line in a file that may start with preamble lines.
///
/// Returns the 1-indexed record number of the first record with at least
/// two non-empty fields, a date keyword among them, and no field that is
/// itself a date or an amount. Falls back to 1 when no record qualifies.
pub fn detect_header_row(records: &[Vec<String>]) -> usize {
    records
        .iter()
        .take(HEADER_SEARCH_DEPTH)
        .position(|record| looks_like_header(record))
        .map(|idx| idx + 1)
        .unwrap_or(1)
}

fn looks_like_header(record: &[String]) -> bool {
    let filled: Vec<&str> = record
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    filled.len() >= 2
        && !filled.iter().any(|f| is_value(f))
        && filled.iter().any(|f| f.len() <= 40 && DATE_WORD.is_match(f))
}

fn is_value(field: &str) -> bool {
    NUMERIC_CELL.is_match(field) || !dates::detect_candidates(&[field]).is_empty()
}
