//! Column mapping domain model
//!
//! A mapping binds semantic transaction fields to raw CSV header names.
//! User input, saved JSON and auto-detection all produce a
//! [`ColumnMappingDraft`]; the only way to obtain a [`ColumnMapping`] is
//! [`ColumnMappingDraft::validate`], so the row parser never sees a partial
//! or contradictory mapping.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

// =============================================================================
// Date formats
// =============================================================================

/// Supported date layouts, listed in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDayDash,
    #[serde(rename = "YYYY/MM/DD")]
    YearMonthDaySlash,
    #[serde(rename = "MM/DD/YYYY")]
    MonthDayYearSlash,
    #[serde(rename = "DD/MM/YYYY")]
    DayMonthYearSlash,
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYearDash,
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYearDash,
    #[serde(rename = "DD.MM.YYYY")]
    DayMonthYearDot,
}

const MONTH: &str = r"(?P<m>0?[1-9]|1[0-2])";
const DAY: &str = r"(?P<d>0?[1-9]|[12][0-9]|3[01])";
const YEAR: &str = r"(?P<y>[0-9]{4})";

static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DateFormat::ALL
        .iter()
        .map(|format| {
            let pattern = match format {
                DateFormat::YearMonthDayDash => format!("^{YEAR}-{MONTH}-{DAY}$"),
                DateFormat::YearMonthDaySlash => format!("^{YEAR}/{MONTH}/{DAY}$"),
                DateFormat::MonthDayYearSlash => format!("^{MONTH}/{DAY}/{YEAR}$"),
                DateFormat::DayMonthYearSlash => format!("^{DAY}/{MONTH}/{YEAR}$"),
                DateFormat::MonthDayYearDash => format!("^{MONTH}-{DAY}-{YEAR}$"),
                DateFormat::DayMonthYearDash => format!("^{DAY}-{MONTH}-{YEAR}$"),
                DateFormat::DayMonthYearDot => format!(r"^{DAY}\.{MONTH}\.{YEAR}$"),
            };
            Regex::new(&pattern).expect("date patterns are static and valid")
        })
        .collect()
});

impl DateFormat {
    /// All formats, highest detection priority first.
    ///
    /// ISO comes first, then US month-first before day-first layouts.
    pub const ALL: [DateFormat; 7] = [
        DateFormat::YearMonthDayDash,
        DateFormat::YearMonthDaySlash,
        DateFormat::MonthDayYearSlash,
        DateFormat::DayMonthYearSlash,
        DateFormat::MonthDayYearDash,
        DateFormat::DayMonthYearDash,
        DateFormat::DayMonthYearDot,
    ];

    /// Human-readable pattern, also the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            Self::YearMonthDayDash => "YYYY-MM-DD",
            Self::YearMonthDaySlash => "YYYY/MM/DD",
            Self::MonthDayYearSlash => "MM/DD/YYYY",
            Self::DayMonthYearSlash => "DD/MM/YYYY",
            Self::MonthDayYearDash => "MM-DD-YYYY",
            Self::DayMonthYearDash => "DD-MM-YYYY",
            Self::DayMonthYearDot => "DD.MM.YYYY",
        }
    }

    fn regex(&self) -> &'static Regex {
        let idx = Self::ALL
            .iter()
            .position(|f| f == self)
            .unwrap_or_default();
        &DATE_PATTERNS[idx]
    }

    /// Whether the raw value has this format's shape (ignores calendar validity)
    pub fn matches(&self, raw: &str) -> bool {
        self.regex().is_match(raw.trim())
    }

    /// Parse a raw value, returning None for a shape mismatch or an
    /// impossible calendar date such as 02/30/2024
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let caps = self.regex().captures(raw.trim())?;
        let year: i32 = caps.name("y")?.as_str().parse().ok()?;
        let month: u32 = caps.name("m")?.as_str().parse().ok()?;
        let day: u32 = caps.name("d")?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL
            .iter()
            .find(|f| f.label() == wanted)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|f| f.label()).collect();
                format!("unknown date format '{}', expected one of {}", s, known.join(", "))
            })
    }
}

// =============================================================================
// Amount options
// =============================================================================

/// How the amount is laid out in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountMode {
    /// One signed amount column
    Single,
    /// Separate debit and credit columns
    Split,
}

impl FromStr for AmountMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown amount mode '{}', expected single or split", other)),
        }
    }
}

/// Digit grouping character stripped from amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThousandSeparator {
    /// Whichever of `,` / `.` is not the decimal point, plus spaces and apostrophes
    #[default]
    Auto,
    None,
    Comma,
    Period,
    Space,
    Apostrophe,
}

impl ThousandSeparator {
    /// The explicit character, if this is not `Auto` or `None`
    pub fn as_char(&self) -> Option<char> {
        match self {
            Self::Comma => Some(','),
            Self::Period => Some('.'),
            Self::Space => Some(' '),
            Self::Apostrophe => Some('\''),
            Self::Auto | Self::None => None,
        }
    }
}

impl FromStr for ThousandSeparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "comma" | "," => Ok(Self::Comma),
            "period" | "dot" | "." => Ok(Self::Period),
            "space" | " " => Ok(Self::Space),
            "apostrophe" | "'" => Ok(Self::Apostrophe),
            other => Err(format!("unknown thousand separator '{}'", other)),
        }
    }
}

/// Decimal point character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimalSeparator {
    /// Inferred per value from the digits after the last separator
    #[default]
    Auto,
    Period,
    Comma,
}

impl DecimalSeparator {
    pub fn as_char(&self) -> Option<char> {
        match self {
            Self::Period => Some('.'),
            Self::Comma => Some(','),
            Self::Auto => None,
        }
    }
}

impl FromStr for DecimalSeparator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "period" | "dot" | "." => Ok(Self::Period),
            "comma" | "," => Ok(Self::Comma),
            other => Err(format!("unknown decimal separator '{}'", other)),
        }
    }
}

// =============================================================================
// Mapping
// =============================================================================

fn default_skip_header_rows() -> usize {
    1
}

/// Unvalidated mapping: what detection, user overrides and saved JSON produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappingDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_mode: Option<AmountMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_column: Option<String>,
    #[serde(default)]
    pub negative_in_parentheses: bool,
    #[serde(default)]
    pub thousand_separator: ThousandSeparator,
    #[serde(default)]
    pub decimal_separator: DecimalSeparator,
    #[serde(default = "default_skip_header_rows")]
    pub skip_header_rows: usize,
}

impl Default for ColumnMappingDraft {
    fn default() -> Self {
        Self {
            date_column: None,
            date_format: None,
            amount_mode: None,
            amount_column: None,
            debit_column: None,
            credit_column: None,
            description_column: None,
            merchant_column: None,
            status_column: None,
            negative_in_parentheses: false,
            thousand_separator: ThousandSeparator::Auto,
            decimal_separator: DecimalSeparator::Auto,
            skip_header_rows: default_skip_header_rows(),
        }
    }
}

/// Trim a configured column name, treating blank as unset
fn column(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ColumnMappingDraft {
    /// Check every mapping rule and build the validated mapping.
    ///
    /// All problems are reported together so a user can fix them in one pass.
    pub fn validate(&self) -> Result<ColumnMapping> {
        let mut problems = Vec::new();

        let date_column = column(&self.date_column);
        if date_column.is_none() {
            problems.push("dateColumn is required".to_string());
        }
        if self.date_format.is_none() {
            problems.push("dateFormat is required".to_string());
        }

        let amount_column = column(&self.amount_column);
        let debit_column = column(&self.debit_column);
        let credit_column = column(&self.credit_column);
        let has_single = amount_column.is_some();
        let has_any_split = debit_column.is_some() || credit_column.is_some();
        let has_full_split = debit_column.is_some() && credit_column.is_some();

        let mode = match self.amount_mode {
            Some(mode) => Some(mode),
            None if has_single && !has_any_split => Some(AmountMode::Single),
            None if has_full_split && !has_single => Some(AmountMode::Split),
            None if has_single => {
                problems.push(
                    "both amountColumn and debitColumn/creditColumn are set; choose one amount strategy"
                        .to_string(),
                );
                None
            }
            None if has_any_split => {
                problems.push("debitColumn and creditColumn must be set together".to_string());
                None
            }
            None => {
                problems.push(
                    "no amount configured: set amountColumn, or debitColumn and creditColumn"
                        .to_string(),
                );
                None
            }
        };

        let amount = match mode {
            Some(AmountMode::Single) => {
                if has_any_split {
                    problems.push(
                        "debitColumn/creditColumn must not be set when amountMode is single"
                            .to_string(),
                    );
                }
                match amount_column {
                    Some(column) => Some(AmountColumns::Single { column }),
                    None => {
                        problems.push("amountColumn is required when amountMode is single".to_string());
                        None
                    }
                }
            }
            Some(AmountMode::Split) => {
                if has_single {
                    problems.push("amountColumn must not be set when amountMode is split".to_string());
                }
                match (debit_column, credit_column) {
                    (Some(debit), Some(credit)) => Some(AmountColumns::Split { debit, credit }),
                    _ => {
                        problems.push(
                            "debitColumn and creditColumn are both required when amountMode is split"
                                .to_string(),
                        );
                        None
                    }
                }
            }
            None => None,
        };

        if self.skip_header_rows == 0 {
            problems.push("skipHeaderRows must be at least 1 (the header row)".to_string());
        }

        if let (Some(t), Some(d)) = (
            self.thousand_separator.as_char(),
            self.decimal_separator.as_char(),
        ) {
            if t == d {
                problems.push(format!(
                    "thousandSeparator and decimalSeparator are both '{}'",
                    t
                ));
            }
        }

        let description_column = column(&self.description_column);
        let merchant_column = column(&self.merchant_column);
        let status_column = column(&self.status_column);

        // One header may serve one role only
        let mut bound: Vec<(&str, String)> = Vec::new();
        let roles = [
            ("dateColumn", &date_column),
            ("amountColumn", &column(&self.amount_column)),
            ("debitColumn", &column(&self.debit_column)),
            ("creditColumn", &column(&self.credit_column)),
            ("descriptionColumn", &description_column),
            ("merchantColumn", &merchant_column),
            ("statusColumn", &status_column),
        ];
        for (role, name) in roles {
            if let Some(name) = name {
                let key = name.to_lowercase();
                if let Some((other, _)) = bound.iter().find(|(_, n)| *n == key) {
                    problems.push(format!("column '{}' is bound to both {} and {}", name, other, role));
                } else {
                    bound.push((role, key));
                }
            }
        }

        match (problems.is_empty(), date_column, self.date_format, amount) {
            (true, Some(date_column), Some(date_format), Some(amount)) => Ok(ColumnMapping {
                date_column,
                date_format,
                amount,
                description_column,
                merchant_column,
                status_column,
                negative_in_parentheses: self.negative_in_parentheses,
                thousand_separator: self.thousand_separator,
                decimal_separator: self.decimal_separator,
                skip_header_rows: self.skip_header_rows,
            }),
            _ => Err(Error::InvalidMapping(problems)),
        }
    }
}

/// Which columns carry the amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountColumns {
    Single { column: String },
    Split { debit: String, credit: String },
}

impl AmountColumns {
    pub fn mode(&self) -> AmountMode {
        match self {
            Self::Single { .. } => AmountMode::Single,
            Self::Split { .. } => AmountMode::Split,
        }
    }
}

/// Validated column mapping
///
/// Serializes through [`ColumnMappingDraft`], so a mapping loaded from
/// storage is re-validated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColumnMappingDraft", into = "ColumnMappingDraft")]
pub struct ColumnMapping {
    pub date_column: String,
    pub date_format: DateFormat,
    pub amount: AmountColumns,
    pub description_column: Option<String>,
    pub merchant_column: Option<String>,
    pub status_column: Option<String>,
    pub negative_in_parentheses: bool,
    pub thousand_separator: ThousandSeparator,
    pub decimal_separator: DecimalSeparator,
    pub skip_header_rows: usize,
}

impl ColumnMapping {
    /// Shortcut for the common single-column layout
    pub fn single(
        date_column: impl Into<String>,
        date_format: DateFormat,
        amount_column: impl Into<String>,
    ) -> Result<Self> {
        ColumnMappingDraft {
            date_column: Some(date_column.into()),
            date_format: Some(date_format),
            amount_mode: Some(AmountMode::Single),
            amount_column: Some(amount_column.into()),
            ..Default::default()
        }
        .validate()
    }

    /// Shortcut for the debit/credit layout
    pub fn split(
        date_column: impl Into<String>,
        date_format: DateFormat,
        debit_column: impl Into<String>,
        credit_column: impl Into<String>,
    ) -> Result<Self> {
        ColumnMappingDraft {
            date_column: Some(date_column.into()),
            date_format: Some(date_format),
            amount_mode: Some(AmountMode::Split),
            debit_column: Some(debit_column.into()),
            credit_column: Some(credit_column.into()),
            ..Default::default()
        }
        .validate()
    }

    /// Back to the editable form
    pub fn to_draft(&self) -> ColumnMappingDraft {
        self.clone().into()
    }

    /// Every header name this mapping reads
    pub fn configured_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.date_column.as_str()];
        match &self.amount {
            AmountColumns::Single { column } => columns.push(column),
            AmountColumns::Split { debit, credit } => {
                columns.push(debit);
                columns.push(credit);
            }
        }
        columns.extend(
            [
                &self.description_column,
                &self.merchant_column,
                &self.status_column,
            ]
            .into_iter()
            .flatten()
            .map(String::as_str),
        );
        columns
    }

    /// Configured columns that cannot be found in `headers`
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.configured_columns()
            .into_iter()
            .filter(|name| header_index(headers, name).is_none())
            .map(str::to_string)
            .collect()
    }
}

impl TryFrom<ColumnMappingDraft> for ColumnMapping {
    type Error = Error;

    fn try_from(draft: ColumnMappingDraft) -> Result<Self> {
        draft.validate()
    }
}

impl From<ColumnMapping> for ColumnMappingDraft {
    fn from(mapping: ColumnMapping) -> Self {
        let (amount_column, debit_column, credit_column) = match mapping.amount {
            AmountColumns::Single { column } => (Some(column), None, None),
            AmountColumns::Split { debit, credit } => (None, Some(debit), Some(credit)),
        };
        let amount_mode = if amount_column.is_some() {
            AmountMode::Single
        } else {
            AmountMode::Split
        };
        Self {
            date_column: Some(mapping.date_column),
            date_format: Some(mapping.date_format),
            amount_mode: Some(amount_mode),
            amount_column,
            debit_column,
            credit_column,
            description_column: mapping.description_column,
            merchant_column: mapping.merchant_column,
            status_column: mapping.status_column,
            negative_in_parentheses: mapping.negative_in_parentheses,
            thousand_separator: mapping.thousand_separator,
            decimal_separator: mapping.decimal_separator,
            skip_header_rows: mapping.skip_header_rows,
        }
    }
}

/// Locate a header by name: exact (trimmed) match first, then case-insensitive
pub fn header_index(headers: &[String], name: &str) -> Option<usize> {
    let name = name.trim();
    headers
        .iter()
        .position(|h| h.trim() == name)
        .or_else(|| {
            let lower = name.to_lowercase();
            headers.iter().position(|h| h.trim().to_lowercase() == lower)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_draft() -> ColumnMappingDraft {
        ColumnMappingDraft {
            date_column: Some("Date".into()),
            date_format: Some(DateFormat::YearMonthDayDash),
            amount_column: Some("Amount".into()),
            ..Default::default()
        }
    }

    fn problems(draft: &ColumnMappingDraft) -> Vec<String> {
        match draft.validate() {
            Err(Error::InvalidMapping(problems)) => problems,
            other => panic!("expected InvalidMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_single_mode_inferred() {
        let mapping = single_draft().validate().unwrap();
        assert_eq!(mapping.amount.mode(), AmountMode::Single);
        assert_eq!(mapping.skip_header_rows, 1);
    }

    #[test]
    fn test_split_mode_inferred() {
        let draft = ColumnMappingDraft {
            amount_column: None,
            debit_column: Some("Debit".into()),
            credit_column: Some("Credit".into()),
            ..single_draft()
        };
        let mapping = draft.validate().unwrap();
        assert_eq!(
            mapping.amount,
            AmountColumns::Split { debit: "Debit".into(), credit: "Credit".into() }
        );
    }

    #[test]
    fn test_neither_amount_strategy_rejected() {
        let draft = ColumnMappingDraft { amount_column: None, ..single_draft() };
        assert!(problems(&draft)[0].contains("no amount configured"));
    }

    #[test]
    fn test_both_amount_strategies_rejected() {
        let draft = ColumnMappingDraft {
            debit_column: Some("Debit".into()),
            credit_column: Some("Credit".into()),
            ..single_draft()
        };
        assert!(problems(&draft)[0].contains("choose one amount strategy"));

        let explicit = ColumnMappingDraft { amount_mode: Some(AmountMode::Split), ..draft };
        assert!(problems(&explicit)
            .iter()
            .any(|p| p.contains("amountColumn must not be set")));
    }

    #[test]
    fn test_half_split_rejected() {
        let draft = ColumnMappingDraft {
            amount_column: None,
            amount_mode: Some(AmountMode::Split),
            debit_column: Some("Debit".into()),
            ..single_draft()
        };
        assert!(problems(&draft)[0].contains("both required"));
    }

    #[test]
    fn test_missing_date_fields_reported_together() {
        let draft = ColumnMappingDraft {
            date_column: Some("   ".into()),
            date_format: None,
            ..single_draft()
        };
        let problems = problems(&draft);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("dateColumn"));
        assert!(problems[1].contains("dateFormat"));
    }

    #[test]
    fn test_column_bound_twice_rejected() {
        let draft = ColumnMappingDraft {
            description_column: Some("amount".into()),
            ..single_draft()
        };
        assert!(problems(&draft)[0].contains("bound to both amountColumn and descriptionColumn"));
    }

    #[test]
    fn test_zero_skip_rows_and_same_separators_rejected() {
        let draft = ColumnMappingDraft {
            skip_header_rows: 0,
            thousand_separator: ThousandSeparator::Comma,
            decimal_separator: DecimalSeparator::Comma,
            ..single_draft()
        };
        assert_eq!(problems(&draft).len(), 2);
    }

    #[test]
    fn test_serde_roundtrip_revalidates() {
        let mapping = single_draft().validate().unwrap();
        let json = serde_json::to_string(&mapping).unwrap();
        assert!(json.contains("\"dateFormat\":\"YYYY-MM-DD\""));
        assert!(json.contains("\"amountMode\":\"single\""));
        let back: ColumnMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mapping);

        let broken = r#"{"dateColumn":"Date","dateFormat":"YYYY-MM-DD"}"#;
        assert!(serde_json::from_str::<ColumnMapping>(broken).is_err());
    }

    #[test]
    fn test_missing_columns() {
        let mapping = ColumnMappingDraft {
            description_column: Some("Memo".into()),
            ..single_draft()
        }
        .validate()
        .unwrap();
        let headers = vec!["date".to_string(), " Amount ".to_string()];
        assert_eq!(mapping.missing_columns(&headers), vec!["Memo".to_string()]);
    }

    #[test]
    fn test_date_format_parse() {
        let d = DateFormat::DayMonthYearSlash.parse("13/01/2024").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 13).unwrap());
        assert!(DateFormat::MonthDayYearSlash.parse("13/01/2024").is_none());
        assert!(DateFormat::MonthDayYearSlash.parse("02/30/2024").is_none());
        assert!(DateFormat::MonthDayYearSlash.matches("02/30/2024"));
        assert_eq!(
            DateFormat::MonthDayYearSlash.parse(" 1/5/2024 "),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
        assert_eq!(
            DateFormat::DayMonthYearDot.parse("05.01.2024"),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn test_date_format_from_str() {
        assert_eq!("dd/mm/yyyy".parse::<DateFormat>(), Ok(DateFormat::DayMonthYearSlash));
        assert!("YYYYMMDD".parse::<DateFormat>().is_err());
    }
}
