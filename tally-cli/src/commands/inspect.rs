//! Inspect command - what a CSV file looks like to the importer

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{get_context, read_file};
use crate::output;

pub fn run(file: &Path, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let bytes = read_file(file)?;
    let preview = ctx.import_service.preview_file(&bytes)?;

    if json {
        return output::json(&preview);
    }

    println!(
        "{} rows, {} columns, delimiter {:?}, header on line {}",
        preview.total_row_count,
        preview.headers.len(),
        preview.delimiter,
        preview.header_row
    );
    println!();

    let mut table = output::create_table();
    table.set_header(preview.headers.clone());
    for row in &preview.sample_rows {
        table.add_row(row.clone());
    }
    println!("{}", table);

    if preview.total_row_count > preview.sample_rows.len() {
        println!(
            "{}",
            format!("... and {} more", preview.total_row_count - preview.sample_rows.len()).dimmed()
        );
    }

    println!();
    println!("{}", "Detected columns:".cyan());
    let draft = &preview.detected_mapping;
    let roles = [
        ("Date", &draft.date_column),
        ("Amount", &draft.amount_column),
        ("Debit", &draft.debit_column),
        ("Credit", &draft.credit_column),
        ("Description", &draft.description_column),
        ("Merchant", &draft.merchant_column),
        ("Status", &draft.status_column),
    ];
    for (label, column) in roles {
        if let Some(column) = column {
            println!("  {}: {}", label, column);
        }
    }

    match preview.date_format_candidates.as_slice() {
        [] => output::warning("No supported date format fits the date column"),
        [only] => println!("  Date format: {}", only),
        [first, ..] => {
            println!("  Date format: {}", first);
            let all: Vec<String> = preview
                .date_format_candidates
                .iter()
                .map(|f| f.to_string())
                .collect();
            output::warning(&format!(
                "Dates are ambiguous ({}); pass --date-format to import if {} is wrong",
                all.join(", "),
                first
            ));
        }
    }

    if let Err(e) = draft.validate() {
        println!();
        output::warning(&format!("Detected mapping is incomplete: {}", e));
    }

    Ok(())
}
