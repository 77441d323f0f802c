//! Import command - import transactions from CSV

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use dialoguer::Confirm;

use super::{get_context, log_event, parse_account_id, read_file};
use crate::output;
use tally_core::domain::{AmountMode, DecimalSeparator, ThousandSeparator};
use tally_core::services::{ImportPreview, LogEvent, LoggingService};
use tally_core::{ColumnMappingDraft, DateFormat, ParseError};

#[derive(Args)]
pub struct ImportArgs {
    /// Path to CSV file
    pub file: PathBuf,
    /// Account ID to import into
    #[arg(long)]
    pub account_id: String,
    /// Preview without importing
    #[arg(long)]
    pub preview: bool,
    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
    /// Write rows that failed to parse to this CSV file
    #[arg(long)]
    pub error_report: Option<PathBuf>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub mapping: MappingOverrides,
}

/// Per-run changes to the saved or detected mapping
#[derive(Args)]
pub struct MappingOverrides {
    /// Column name for transaction date
    #[arg(long)]
    pub date_column: Option<String>,
    /// Date format, e.g. YYYY-MM-DD or DD/MM/YYYY
    #[arg(long)]
    pub date_format: Option<DateFormat>,
    /// Column name for a signed amount
    #[arg(long, conflicts_with_all = ["debit_column", "credit_column"])]
    pub amount_column: Option<String>,
    /// Column name for debit (money out) amounts
    #[arg(long, requires = "credit_column")]
    pub debit_column: Option<String>,
    /// Column name for credit (money in) amounts
    #[arg(long, requires = "debit_column")]
    pub credit_column: Option<String>,
    /// Column name for transaction description
    #[arg(long)]
    pub description_column: Option<String>,
    /// Column name for merchant or payee
    #[arg(long)]
    pub merchant_column: Option<String>,
    /// Column name for posted/pending status
    #[arg(long)]
    pub status_column: Option<String>,
    /// Treat amounts in parentheses as negative
    #[arg(long)]
    pub negative_in_parentheses: bool,
    /// Digit grouping: auto, none, comma, period, space, apostrophe
    #[arg(long)]
    pub thousand_separator: Option<ThousandSeparator>,
    /// Decimal point: auto, period, comma
    #[arg(long)]
    pub decimal_separator: Option<DecimalSeparator>,
    /// 1-indexed line holding the header row
    #[arg(long)]
    pub skip_header_rows: Option<usize>,
}

impl MappingOverrides {
    fn is_empty(&self) -> bool {
        self.date_column.is_none()
            && self.date_format.is_none()
            && self.amount_column.is_none()
            && self.debit_column.is_none()
            && self.credit_column.is_none()
            && self.description_column.is_none()
            && self.merchant_column.is_none()
            && self.status_column.is_none()
            && !self.negative_in_parentheses
            && self.thousand_separator.is_none()
            && self.decimal_separator.is_none()
            && self.skip_header_rows.is_none()
    }

    fn apply(&self, draft: &mut ColumnMappingDraft) {
        if let Some(column) = &self.date_column {
            draft.date_column = Some(column.clone());
        }
        if let Some(format) = self.date_format {
            draft.date_format = Some(format);
        }
        if let Some(column) = &self.amount_column {
            draft.amount_mode = Some(AmountMode::Single);
            draft.amount_column = Some(column.clone());
            draft.debit_column = None;
            draft.credit_column = None;
        }
        if let (Some(debit), Some(credit)) = (&self.debit_column, &self.credit_column) {
            draft.amount_mode = Some(AmountMode::Split);
            draft.amount_column = None;
            draft.debit_column = Some(debit.clone());
            draft.credit_column = Some(credit.clone());
        }
        if let Some(column) = &self.description_column {
            draft.description_column = Some(column.clone());
        }
        if let Some(column) = &self.merchant_column {
            draft.merchant_column = Some(column.clone());
        }
        if let Some(column) = &self.status_column {
            draft.status_column = Some(column.clone());
        }
        if self.negative_in_parentheses {
            draft.negative_in_parentheses = true;
        }
        if let Some(separator) = self.thousand_separator {
            draft.thousand_separator = separator;
        }
        if let Some(separator) = self.decimal_separator {
            draft.decimal_separator = separator;
        }
        if let Some(rows) = self.skip_header_rows {
            draft.skip_header_rows = rows;
        }
    }
}

pub fn run(args: ImportArgs, logger: &Option<LoggingService>) -> Result<()> {
    let ctx = get_context()?;
    let service = &ctx.import_service;

    let account_id = parse_account_id(&args.account_id)?;
    let account = ctx.account_service.get_account(account_id)?;
    let bytes = read_file(&args.file)?;

    let mut session = service.start_session(bytes, Some(account_id))?;

    // Saved mapping fits and nothing to override: preview is already there.
    // Otherwise start from the saved mapping (or the detected one) and apply
    // the command-line overrides.
    if session.mapping().is_none() || !args.mapping.is_empty() {
        let mut draft = match (&account.mapping, session.mapping()) {
            (Some(saved), Some(_)) => saved.to_draft(),
            _ => session.file.detected_mapping.clone(),
        };
        args.mapping.apply(&mut draft);

        if !args.json {
            if session.mapping().is_none() {
                if let Some(saved) = &account.mapping {
                    let missing = saved.missing_columns(&session.file.headers);
                    output::warning(&format!(
                        "Saved mapping does not fit this file (missing: {}); using detected columns",
                        missing.join(", ")
                    ));
                } else {
                    output::info("No saved mapping for this account; using detected columns");
                }
            }
            if session.file.date_format_ambiguous && args.mapping.date_format.is_none() {
                let all: Vec<String> = session
                    .file
                    .date_format_candidates
                    .iter()
                    .map(|f| f.to_string())
                    .collect();
                output::warning(&format!(
                    "Date format is ambiguous ({}); assuming {}. Use --date-format to choose.",
                    all.join(", "),
                    draft
                        .date_format
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "none".into())
                ));
            }
        }

        if let Err(e) = service.confirm_mapping(&mut session, &draft) {
            log_event(
                logger,
                LogEvent::new("import_failed")
                    .with_command("import")
                    .with_stage("mapping")
                    .with_error(e.to_string()),
            );
            return Err(e).context("Column mapping is not usable; pass mapping options such as --date-column or --amount-column");
        }
    }

    let preview = session
        .preview()
        .cloned()
        .context("Import session has no preview")?;

    log_event(
        logger,
        LogEvent::new("import_previewed")
            .with_command("import")
            .with_stage("preview")
            .with_counts(preview.total_count, preview.errors.len()),
    );

    if let Some(path) = &args.error_report {
        write_error_report(path, &preview.errors)?;
    }

    if args.preview {
        if args.json {
            return output::json(serde_json::json!({
                "mapping": session.mapping(),
                "preview": &preview,
            }));
        }
        println!("{}", "PREVIEW MODE - No changes applied".yellow());
        println!();
        print_preview(&preview, ctx.config.import.error_detail_limit);
        return Ok(());
    }

    if !args.json && !args.yes {
        print_preview(&preview, ctx.config.import.error_detail_limit);
        println!();
        if !atty::is(atty::Stream::Stdin) {
            bail!("Refusing to import without confirmation; pass --yes");
        }
        if !Confirm::new()
            .with_prompt(format!(
                "Import {} new transaction(s) into '{}'?",
                preview.new_count, account.name
            ))
            .default(true)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let mapping_changed = account.mapping.as_ref() != session.mapping();
    let result = match service.commit_session(&mut session) {
        Ok(result) => result,
        Err(e) => {
            log_event(
                logger,
                LogEvent::new("import_failed")
                    .with_command("import")
                    .with_stage("commit")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };

    log_event(
        logger,
        LogEvent::new("import_committed")
            .with_command("import")
            .with_stage("commit")
            .with_counts(result.imported + result.skipped, result.errors.len()),
    );

    if args.json {
        return output::json(&result);
    }

    output::success("Import complete");
    if mapping_changed {
        println!("{}", "Column mapping saved on the account".dimmed());
    }
    println!();
    println!("  Imported: {}", result.imported);
    println!("  Skipped (already imported): {}", result.skipped);
    println!("  Rows with errors: {}", result.errors.len());
    println!("  Batch: {}", result.batch_id.dimmed());
    if let Some(path) = &args.error_report {
        if !result.errors.is_empty() {
            println!("  Error report: {}", path.display());
        }
    }

    Ok(())
}

fn print_preview(preview: &ImportPreview, error_limit: usize) {
    if !preview.transactions.is_empty() {
        let mut table = output::create_table();
        table.set_header(vec!["Row", "Date", "Amount", "Description", ""]);
        for tx in &preview.transactions {
            table.add_row(vec![
                tx.row.row_number.to_string(),
                tx.row.date.to_string(),
                output::format_amount(tx.row.amount, tx.row.kind),
                tx.row.description.clone(),
                if tx.duplicate { "duplicate".dimmed().to_string() } else { String::new() },
            ]);
        }
        println!("{}", table);
        if preview.total_count > preview.transactions.len() {
            println!("... and {} more", preview.total_count - preview.transactions.len());
        }
        println!();
    }

    println!("  Parsed: {}", preview.total_count);
    println!("  New: {}", preview.new_count.to_string().green());
    println!("  Already imported: {}", preview.duplicate_count);
    output::row_errors(&preview.errors, error_limit);
}

/// One CSV line per failed row
fn write_error_report(path: &Path, errors: &[ParseError]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create error report {}", path.display()))?;
    writer.write_record(["row", "column", "message", "value"])?;
    for err in errors {
        writer.write_record([
            err.row_number.to_string(),
            err.column.clone().unwrap_or_default(),
            err.message.clone(),
            err.raw_value.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
