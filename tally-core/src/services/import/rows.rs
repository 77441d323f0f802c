//! Row parsing and validation
//!
//! Every data row yields exactly one verdict: a [`ParsedRow`] or a
//! [`ParseError`]. A bad row never stops the rest of the file.

use serde::Serialize;

use super::amount::{self, FieldError, RawAmount};
use super::tokenizer::CsvTable;
use crate::domain::mapping::header_index;
use crate::domain::result::{Error, Result};
use crate::domain::{
    AmountColumns, ColumnMapping, ParseError, ParsedRow, TransactionKind, TransactionStatus,
};

/// Parsed rows and row-scoped errors, in file order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub transactions: Vec<ParsedRow>,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    /// Number of data rows looked at
    pub fn row_count(&self) -> usize {
        self.transactions.len() + self.errors.len()
    }
}

enum AmountIndex {
    Single(usize),
    Split { debit: usize, credit: usize },
}

/// Header positions for every configured column, resolved once per file
struct Resolved {
    date: usize,
    amount: AmountIndex,
    description: Option<usize>,
    merchant: Option<usize>,
    status: Option<usize>,
}

impl Resolved {
    fn new(headers: &[String], mapping: &ColumnMapping) -> Result<Self> {
        let missing = mapping.missing_columns(headers);
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }
        let find = |name: &str| {
            header_index(headers, name).ok_or_else(|| Error::MissingColumns(vec![name.to_string()]))
        };
        let optional = |name: &Option<String>| name.as_deref().and_then(|n| header_index(headers, n));

        let amount = match &mapping.amount {
            AmountColumns::Single { column } => AmountIndex::Single(find(column)?),
            AmountColumns::Split { debit, credit } => AmountIndex::Split {
                debit: find(debit)?,
                credit: find(credit)?,
            },
        };

        Ok(Self {
            date: find(&mapping.date_column)?,
            amount,
            description: optional(&mapping.description_column),
            merchant: optional(&mapping.merchant_column),
            status: optional(&mapping.status_column),
        })
    }
}

/// Parse every data row of `table` with a validated mapping.
///
/// Fails only when a configured column is not in the header row; that is a
/// mapping problem and is reported before any row is read.
pub fn parse_all(table: &CsvTable, mapping: &ColumnMapping) -> Result<ParseOutcome> {
    let columns = Resolved::new(&table.headers, mapping)?;
    let mut outcome = ParseOutcome::default();

    for (idx, row) in table.rows.iter().enumerate() {
        let row_number = idx + 1;
        match parse_row(row_number, row, &columns, mapping) {
            Ok(parsed) => outcome.transactions.push(parsed),
            Err(error) => outcome.errors.push(error),
        }
    }

    tracing::debug!(
        rows = outcome.row_count(),
        parsed = outcome.transactions.len(),
        errors = outcome.errors.len(),
        "parsed rows"
    );
    Ok(outcome)
}

fn parse_row(
    row_number: usize,
    row: &[String],
    columns: &Resolved,
    mapping: &ColumnMapping,
) -> std::result::Result<ParsedRow, ParseError> {
    let cell = |idx: usize| CsvTable::cell(row, idx).trim();
    let field_error = |e: FieldError| ParseError {
        row_number,
        column: Some(e.column),
        message: e.message,
        raw_value: e.raw_value,
    };

    let raw_date = cell(columns.date);
    if raw_date.is_empty() {
        return Err(ParseError {
            row_number,
            column: Some(mapping.date_column.clone()),
            message: "date is empty".to_string(),
            raw_value: None,
        });
    }
    let date = mapping.date_format.parse(raw_date).ok_or_else(|| ParseError {
        row_number,
        column: Some(mapping.date_column.clone()),
        message: format!("date does not match format {}", mapping.date_format),
        raw_value: Some(raw_date.to_string()),
    })?;

    let raw_amount = match columns.amount {
        AmountIndex::Single(i) => RawAmount::Single(cell(i)),
        AmountIndex::Split { debit, credit } => RawAmount::Split {
            debit: cell(debit),
            credit: cell(credit),
        },
    };
    let normalized = amount::normalize(raw_amount, mapping).map_err(field_error)?;

    let text = |idx: Option<usize>| {
        idx.map(cell)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let merchant = text(columns.merchant);
    let description = text(columns.description)
        .or_else(|| merchant.clone())
        .unwrap_or_else(|| placeholder_description(normalized.kind, &normalized.amount, &date));
    let status = columns
        .status
        .map(cell)
        .and_then(TransactionStatus::from_raw);

    Ok(ParsedRow {
        row_number,
        date,
        description,
        amount: normalized.amount,
        kind: normalized.kind,
        merchant,
        status,
        raw: row.to_vec(),
    })
}

fn placeholder_description(
    kind: TransactionKind,
    amount: &rust_decimal::Decimal,
    date: &chrono::NaiveDate,
) -> String {
    let label = match kind {
        TransactionKind::Income => "Income",
        TransactionKind::Expense => "Expense",
    };
    format!("{} of {} on {}", label, amount, date)
}
