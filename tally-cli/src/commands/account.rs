//! Account command - create and inspect import accounts

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{get_context, parse_account_id, read_mapping_file};
use crate::output;
use tally_core::domain::AmountColumns;
use tally_core::{ColumnMapping, ImportAccount};

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create an account
    Create {
        /// Account name
        #[arg(long)]
        name: String,
        /// Bank or card issuer
        #[arg(long)]
        institution: Option<String>,
        /// Column mapping JSON to save on the account
        #[arg(long)]
        mapping_file: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show an account, its saved mapping and import totals
    Show {
        /// Account ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace an account's saved column mapping
    SetMapping {
        /// Account ID
        id: String,
        /// Column mapping JSON
        #[arg(long)]
        mapping_file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl AccountCommands {
    pub fn json(&self) -> bool {
        match self {
            AccountCommands::Create { json, .. }
            | AccountCommands::List { json }
            | AccountCommands::Show { json, .. }
            | AccountCommands::SetMapping { json, .. } => *json,
        }
    }
}

pub fn run(command: AccountCommands) -> Result<()> {
    let ctx = get_context()?;
    let accounts = &ctx.account_service;

    match command {
        AccountCommands::Create {
            name,
            institution,
            mapping_file,
            json,
        } => {
            let mapping = mapping_file.as_deref().map(read_mapping_file).transpose()?;
            let id = accounts.create_account(&name, institution.as_deref(), mapping)?;

            if json {
                return output::json(serde_json::json!({ "id": id }));
            }
            output::success(&format!("Created account '{}'", name.trim()));
            println!("  ID: {}", id);
        }
        AccountCommands::List { json } => {
            let list = accounts.list_accounts()?;
            if json {
                return output::json(&list);
            }
            if list.is_empty() {
                println!("No accounts. Create one with: tally account create --name <NAME>");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["ID", "Name", "Institution", "Mapping", "Last import"]);
            for account in &list {
                table.add_row(vec![
                    account.id.to_string(),
                    account.name.clone(),
                    account.institution.clone().unwrap_or_else(|| "-".into()),
                    if account.mapping.is_some() { "saved" } else { "-" }.to_string(),
                    account
                        .last_synced_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".into()),
                ]);
            }
            println!("{}", table);
        }
        AccountCommands::Show { id, json } => {
            let summary = accounts.summary(parse_account_id(&id)?)?;
            if json {
                return output::json(&summary);
            }

            print_account(&summary.account);
            println!();
            println!("  Transactions: {}", summary.transaction_count);
            println!("  Import batches: {}", summary.batch_count);
            if let (Some(first), Some(last)) = (summary.date_range.earliest, summary.date_range.latest) {
                println!("  Date range: {} to {}", first, last);
            }
        }
        AccountCommands::SetMapping {
            id,
            mapping_file,
            json,
        } => {
            let id = parse_account_id(&id)?;
            let mapping = read_mapping_file(&mapping_file)?;
            accounts.update_account_mapping(id, &mapping)?;

            if json {
                return output::json(&mapping);
            }
            output::success("Mapping saved");
            print_mapping(&mapping);
        }
    }

    Ok(())
}

fn print_account(account: &ImportAccount) {
    println!("{}", account.name.bold());
    println!("  ID: {}", account.id);
    if let Some(institution) = &account.institution {
        println!("  Institution: {}", institution);
    }
    match &account.mapping {
        Some(mapping) => print_mapping(mapping),
        None => println!("  Mapping: {}", "none (set on first import)".dimmed()),
    }
}

pub fn print_mapping(mapping: &ColumnMapping) {
    println!("  Date: {} ({})", mapping.date_column, mapping.date_format);
    match &mapping.amount {
        AmountColumns::Single { column } => println!("  Amount: {}", column),
        AmountColumns::Split { debit, credit } => {
            println!("  Debit: {}", debit);
            println!("  Credit: {}", credit);
        }
    }
    let optional = [
        ("Description", &mapping.description_column),
        ("Merchant", &mapping.merchant_column),
        ("Status", &mapping.status_column),
    ];
    for (label, column) in optional {
        if let Some(column) = column {
            println!("  {}: {}", label, column);
        }
    }
    if mapping.skip_header_rows > 1 {
        println!("  Header row: {}", mapping.skip_header_rows);
    }
}
