//! Content fingerprints for re-import protection
//!
//! Only date, signed amount and description feed the hash. Merchant and
//! status can change between exports of the same transaction (pending to
//! posted), so they are left out.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::domain::ParsedRow;

/// Unit separator: never expected inside bank data
const SEPARATOR: char = '\u{1f}';

/// SHA-256 hex digest over the normalized date, amount and description
pub fn fingerprint(date: NaiveDate, signed_amount: Decimal, description: &str) -> String {
    let input = format!(
        "{}{sep}{}{sep}{}",
        date.format("%Y-%m-%d"),
        two_places(signed_amount),
        normalize_description(description),
        sep = SEPARATOR,
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of the n-th repeat (0-based) of an identical row within one
/// file. The first occurrence keeps the plain fingerprint.
pub fn occurrence_fingerprint(base: &str, occurrence: usize) -> String {
    if occurrence == 0 {
        return base.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(format!("{}#{}", base, occurrence).as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprints for a batch of rows, keeping repeats within the batch distinct
pub fn fingerprint_rows(rows: &[ParsedRow]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rows.iter()
        .map(|row| {
            let base = fingerprint(row.date, row.signed_amount(), &row.description);
            let count = seen.entry(base.clone()).or_insert(0);
            let hash = occurrence_fingerprint(&base, *count);
            *count += 1;
            hash
        })
        .collect()
}

/// Trim, lowercase and collapse runs of whitespace
fn normalize_description(desc: &str) -> String {
    desc.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed two-place rendering, so 4.5 and 4.50 hash alike
fn two_places(amount: Decimal) -> String {
    let mut value = amount.round_dp(2);
    value.rescale(2);
    if value.is_zero() {
        value.set_sign_positive(true);
    }
    value.to_string()
}
