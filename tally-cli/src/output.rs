//! Output formatting utilities

use anyhow::Result;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use tally_core::domain::TransactionKind;
use tally_core::{OperationResult, ParseError};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Print data wrapped in a success envelope
pub fn json<T: Serialize>(data: T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&OperationResult::ok(data))?);
    Ok(())
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Signed amount, colored by direction
pub fn format_amount(amount: Decimal, kind: TransactionKind) -> String {
    let signed = kind.signed(amount);
    match kind {
        TransactionKind::Income => format!("{:.2}", signed).green().to_string(),
        TransactionKind::Expense => format!("{:.2}", signed).red().to_string(),
    }
}

/// Row errors, the first `limit` in full
pub fn row_errors(errors: &[ParseError], limit: usize) {
    if errors.is_empty() {
        return;
    }
    println!();
    println!("{}", format!("{} row(s) could not be parsed:", errors.len()).red().bold());
    for err in errors.iter().take(limit) {
        println!("  {}", err);
    }
    if errors.len() > limit {
        println!("  {}", format!("... and {} more", errors.len() - limit).dimmed());
    }
}
