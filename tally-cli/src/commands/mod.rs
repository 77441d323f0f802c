//! CLI command implementations

pub mod account;
pub mod import;
pub mod inspect;
pub mod logs;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tally_core::config::default_tally_dir;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::{ColumnMapping, ColumnMappingDraft, TallyContext};
use uuid::Uuid;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let tally_dir = get_tally_dir().ok()?;
    match LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")) {
        Ok(service) => Some(service),
        Err(e) => {
            tracing::debug!(error = %e, "event log unavailable");
            None
        }
    }
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Tally directory from `TALLY_DIR`, else `~/.tally`
pub fn get_tally_dir() -> Result<PathBuf> {
    Ok(default_tally_dir(dirs::home_dir())?)
}

/// Open the database and services
pub fn get_context() -> Result<TallyContext> {
    let tally_dir = get_tally_dir()?;
    TallyContext::new(&tally_dir)
        .with_context(|| format!("Failed to open tally data in {}", tally_dir.display()))
}

pub fn parse_account_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid account ID: {}", raw))
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Load and validate a mapping JSON file (camelCase keys, as saved on accounts)
pub fn read_mapping_file(path: &Path) -> Result<ColumnMapping> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    let draft: ColumnMappingDraft = serde_json::from_str(&content)
        .with_context(|| format!("Mapping file {} is not valid JSON", path.display()))?;
    Ok(draft.validate()?)
}
