//! Logs command - view the event log

use anyhow::{Context, Result};
use colored::Colorize;

use crate::output;
use tally_core::services::LoggingService;

fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(limit: usize, errors: bool, json: bool, logger: &Option<LoggingService>) -> Result<()> {
    let service = logger
        .as_ref()
        .context("Event log is unavailable; check the tally directory")?;
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        return output::json(&entries);
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Command", "Stage", "Rows", "Errors", ""]);

    for entry in &entries {
        let counts = |n: Option<i64>| n.map(|n| n.to_string()).unwrap_or_default();
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.event.clone(),
            entry.command.clone().unwrap_or_default(),
            entry.stage.clone().unwrap_or_default(),
            counts(entry.row_count),
            counts(entry.error_count),
            if entry.error_message.is_some() { "!".red().to_string() } else { String::new() },
        ]);
    }
    println!("{}", table);

    if !errors {
        let failed: Vec<_> = entries.iter().filter(|e| e.error_message.is_some()).take(3).collect();
        if !failed.is_empty() {
            println!();
            println!("{}", "Recent Errors:".red().bold());
            for err in failed {
                println!(
                    "  {} [{}]: {}",
                    format_timestamp(err.timestamp).dimmed(),
                    err.event,
                    err.error_message.as_deref().unwrap_or("Unknown error")
                );
            }
        }
    }

    Ok(())
}
