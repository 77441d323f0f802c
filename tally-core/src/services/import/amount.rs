//! Amount normalization
//!
//! Converts raw amount cells into a non-negative magnitude plus a
//! transaction kind. Failures are returned as [`FieldError`] values for the
//! row parser to attach to the row; nothing here panics on bad input.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::{AmountColumns, ColumnMapping, DecimalSeparator, ThousandSeparator, TransactionKind};

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Raw cell values for the amount, matching the mapping's amount mode
#[derive(Debug, Clone, Copy)]
pub enum RawAmount<'a> {
    Single(&'a str),
    Split { debit: &'a str, credit: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAmount {
    /// Always non-negative
    pub amount: Decimal,
    pub kind: TransactionKind,
}

/// A problem with one field of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub column: String,
    pub message: String,
    pub raw_value: Option<String>,
}

impl FieldError {
    fn new(column: &str, message: impl Into<String>, raw_value: &str) -> Self {
        Self {
            column: column.to_string(),
            message: message.into(),
            raw_value: Some(raw_value.to_string()),
        }
    }
}

/// Normalize a row's amount cells according to the mapping
pub fn normalize(raw: RawAmount<'_>, mapping: &ColumnMapping) -> Result<NormalizedAmount, FieldError> {
    match (&mapping.amount, raw) {
        (AmountColumns::Single { column }, RawAmount::Single(value)) => {
            let parsed = parse_value(value, mapping)
                .map_err(|message| FieldError::new(column, message, value))?;
            let Some(signed) = parsed else {
                return Err(FieldError::new(column, "amount is empty", value));
            };
            let kind = if signed.is_sign_negative() && !signed.is_zero() {
                TransactionKind::Expense
            } else {
                TransactionKind::Income
            };
            Ok(NormalizedAmount { amount: signed.abs(), kind })
        }
        (AmountColumns::Split { debit: debit_col, credit: credit_col }, RawAmount::Split { debit, credit }) => {
            let debit_value = parse_value(debit, mapping)
                .map_err(|message| FieldError::new(debit_col, message, debit))?
                .unwrap_or_default()
                .abs();
            let credit_value = parse_value(credit, mapping)
                .map_err(|message| FieldError::new(credit_col, message, credit))?
                .unwrap_or_default()
                .abs();

            match (debit_value.is_zero(), credit_value.is_zero()) {
                (false, false) => Err(FieldError {
                    column: format!("{}/{}", debit_col, credit_col),
                    message: "both debit and credit have a value".to_string(),
                    raw_value: Some(format!("{} / {}", debit.trim(), credit.trim())),
                }),
                (true, true) => Err(FieldError {
                    column: format!("{}/{}", debit_col, credit_col),
                    message: "no amount in debit or credit".to_string(),
                    raw_value: None,
                }),
                (false, true) => Ok(NormalizedAmount {
                    amount: debit_value,
                    kind: TransactionKind::Expense,
                }),
                (true, false) => Ok(NormalizedAmount {
                    amount: credit_value,
                    kind: TransactionKind::Income,
                }),
            }
        }
        (AmountColumns::Single { column }, RawAmount::Split { .. })
        | (AmountColumns::Split { debit: column, .. }, RawAmount::Single(_)) => Err(FieldError {
            column: column.clone(),
            message: "amount cells do not match the mapping's amount mode".to_string(),
            raw_value: None,
        }),
    }
}

/// Parse one cell to a signed decimal. `Ok(None)` means the cell is blank.
fn parse_value(raw: &str, mapping: &ColumnMapping) -> Result<Option<Decimal>, String> {
    let mut s: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    if s.is_empty() {
        return Ok(None);
    }

    let mut negative = false;
    if mapping.negative_in_parentheses && s.len() >= 2 && s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].to_string();
        // "(-5)" carries two signs
        if s.starts_with(['-', '+']) || s.ends_with(['-', '+']) {
            return Err("not a number".to_string());
        }
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = true;
        s = rest.to_string();
    }

    let decimal = decimal_char(&s, mapping.thousand_separator, mapping.decimal_separator);
    let grouping: Vec<char> = match mapping.thousand_separator {
        ThousandSeparator::Auto => [',', '.', '\'']
            .into_iter()
            .filter(|c| Some(*c) != decimal)
            .collect(),
        ThousandSeparator::None => Vec::new(),
        explicit => explicit.as_char().into_iter().collect(),
    };
    if !valid_grouping(&s, decimal, &grouping) {
        return Err("not a number".to_string());
    }

    let mut cleaned = String::with_capacity(s.len());
    for c in s.chars() {
        if Some(c) == decimal {
            cleaned.push('.');
        } else if grouping.contains(&c) {
            continue;
        } else if c.is_ascii_digit() {
            cleaned.push(c);
        } else {
            return Err("not a number".to_string());
        }
    }

    if !cleaned.chars().any(|c| c.is_ascii_digit()) || cleaned.matches('.').count() > 1 {
        return Err("not a number".to_string());
    }

    let value = Decimal::from_str(&cleaned).map_err(|_| "amount out of range".to_string())?;
    Ok(Some(if negative { -value } else { value }))
}

/// Grouping separators may only split the integer part, and every group
/// after the first must have exactly three digits
fn valid_grouping(s: &str, decimal: Option<char>, grouping: &[char]) -> bool {
    let (integer, fraction) = match decimal.and_then(|d| s.find(d).map(|pos| (pos, d))) {
        Some((pos, d)) => (&s[..pos], &s[pos + d.len_utf8()..]),
        None => (s, ""),
    };
    if fraction.contains(grouping) {
        return false;
    }

    let mut groups = integer.split(grouping);
    let first = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    rest.is_empty() || ((1..=3).contains(&first.len()) && rest.iter().all(|g| g.len() == 3))
}

/// Decide which character is the decimal point for this value
fn decimal_char(s: &str, thousand: ThousandSeparator, decimal: DecimalSeparator) -> Option<char> {
    if let Some(c) = decimal.as_char() {
        return Some(c);
    }
    match thousand {
        ThousandSeparator::Comma => return Some('.'),
        ThousandSeparator::Period => return Some(','),
        _ => {}
    }

    let Some(pos) = s.rfind(['.', ',']) else {
        return Some('.');
    };
    let separator = s[pos..].chars().next().unwrap_or('.');
    let trailing = &s[pos + separator.len_utf8()..];
    let digits = trailing.len();
    let all_digits = trailing.chars().all(|c| c.is_ascii_digit());

    match (all_digits, digits) {
        (true, 2) => Some(separator),
        // Thousands grouping, so the value has no fractional part
        (true, 3) => None,
        _ => Some('.'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnMappingDraft, DateFormat};

    fn single() -> ColumnMapping {
        ColumnMapping::single("Date", DateFormat::YearMonthDayDash, "Amount").unwrap()
    }

    fn split() -> ColumnMapping {
        ColumnMapping::split("Date", DateFormat::YearMonthDayDash, "Debit", "Credit").unwrap()
    }

    fn with(draft_fn: impl FnOnce(&mut ColumnMappingDraft)) -> ColumnMapping {
        let mut draft = single().to_draft();
        draft_fn(&mut draft);
        draft.validate().unwrap()
    }

    fn amount(raw: &str, mapping: &ColumnMapping) -> NormalizedAmount {
        normalize(RawAmount::Single(raw), mapping).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_single_sign() {
        let m = single();
        assert_eq!(
            amount("-42.50", &m),
            NormalizedAmount { amount: dec("42.50"), kind: TransactionKind::Expense }
        );
        assert_eq!(
            amount("42.50", &m),
            NormalizedAmount { amount: dec("42.50"), kind: TransactionKind::Income }
        );
        assert_eq!(amount("+10", &m).kind, TransactionKind::Income);
        assert_eq!(amount("42.50-", &m).kind, TransactionKind::Expense);
        assert_eq!(amount("0.00", &m).kind, TransactionKind::Income);
    }

    #[test]
    fn test_parentheses() {
        let m = with(|d| d.negative_in_parentheses = true);
        assert_eq!(
            amount("(42.50)", &m),
            NormalizedAmount { amount: dec("42.50"), kind: TransactionKind::Expense }
        );
        assert_eq!(amount("($1,000.00)", &m).amount, dec("1000"));

        for raw in ["(-5)", "(+5)", "(5-)"] {
            let err = normalize(RawAmount::Single(raw), &m).unwrap_err();
            assert_eq!(err.message, "not a number", "{}", raw);
        }

        let err = normalize(RawAmount::Single("(42.50)"), &single()).unwrap_err();
        assert_eq!(err.column, "Amount");
        assert_eq!(err.raw_value.as_deref(), Some("(42.50)"));
    }

    #[test]
    fn test_auto_separators() {
        let m = single();
        assert_eq!(amount("$1,234.56", &m).amount, dec("1234.56"));
        assert_eq!(amount("1.234,56", &m).amount, dec("1234.56"));
        assert_eq!(amount("1,234", &m).amount, dec("1234"));
        assert_eq!(amount("1.234.567", &m).amount, dec("1234567"));
        assert_eq!(amount("€\u{a0}1 234,56", &m).amount, dec("1234.56"));
        assert_eq!(amount("3.5", &m).amount, dec("3.5"));
        assert_eq!(amount("1'000.25", &m).amount, dec("1000.25"));

        // A separator that is neither a decimal point nor 3-digit grouping
        for raw in ["1.234,5", "0,5", "12,3456", "1,2,345", "12345,678.9"] {
            let err = normalize(RawAmount::Single(raw), &m).unwrap_err();
            assert_eq!(err.message, "not a number", "{}", raw);
            assert_eq!(err.raw_value.as_deref(), Some(raw));
        }
    }

    #[test]
    fn test_explicit_separators() {
        let m = with(|d| {
            d.decimal_separator = DecimalSeparator::Comma;
        });
        assert_eq!(amount("1.234.567,8", &m).amount, dec("1234567.8"));

        let m = with(|d| d.thousand_separator = ThousandSeparator::Period);
        assert_eq!(amount("2.500", &m).amount, dec("2500"));
        assert_eq!(amount("2.500,5", &m).amount, dec("2500.5"));

        let m = with(|d| d.thousand_separator = ThousandSeparator::None);
        assert!(normalize(RawAmount::Single("1,234.56"), &m).is_err());
    }

    #[test]
    fn test_non_numeric() {
        let m = single();
        for raw in ["abc", "12a", "1.2.3", "-", "$", "1e5"] {
            let err = normalize(RawAmount::Single(raw), &m).unwrap_err();
            assert_eq!(err.column, "Amount", "{}", raw);
        }
        let err = normalize(RawAmount::Single("  "), &m).unwrap_err();
        assert_eq!(err.message, "amount is empty");
    }

    #[test]
    fn test_split_mode() {
        let m = split();
        let debit = normalize(RawAmount::Split { debit: "12.00", credit: "" }, &m).unwrap();
        assert_eq!(debit, NormalizedAmount { amount: dec("12"), kind: TransactionKind::Expense });

        // Sign in the debit column is ignored
        let debit = normalize(RawAmount::Split { debit: "-12.00", credit: "0" }, &m).unwrap();
        assert_eq!(debit.kind, TransactionKind::Expense);
        assert_eq!(debit.amount, dec("12"));

        let credit = normalize(RawAmount::Split { debit: "0.00", credit: "99.99" }, &m).unwrap();
        assert_eq!(credit.kind, TransactionKind::Income);
    }

    #[test]
    fn test_split_exclusivity() {
        let m = split();
        let both = normalize(RawAmount::Split { debit: "5", credit: "6" }, &m).unwrap_err();
        assert!(both.message.contains("both"));
        assert_eq!(both.column, "Debit/Credit");

        let neither = normalize(RawAmount::Split { debit: "", credit: "0.00" }, &m).unwrap_err();
        assert!(neither.message.contains("no amount"));

        let bad = normalize(RawAmount::Split { debit: "x", credit: "" }, &m).unwrap_err();
        assert_eq!(bad.column, "Debit");
    }

    #[test]
    fn test_mode_mismatch_is_error() {
        assert!(normalize(RawAmount::Split { debit: "1", credit: "" }, &single()).is_err());
    }
}
