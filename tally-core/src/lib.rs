//! Tally Core - CSV statement import engine
//!
//! This crate implements the import pipeline following hexagonal architecture:
//!
//! - **domain**: Value types (ColumnMapping, ParsedRow, Transaction, etc.)
//! - **ports**: Storage traits (AccountRegistry, TransactionStore)
//! - **services**: The import pipeline and account operations
//! - **adapters**: Concrete storage (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use adapters::duckdb::DuckDbRepository;
use config::Config;
use services::{AccountService, ImportService};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{
    ColumnMapping, ColumnMappingDraft, DateFormat, DedupRecord, ImportAccount, ParseError,
    ParsedRow, Transaction,
};

pub const DATABASE_FILE: &str = "tally.duckdb";

/// Main context for Tally operations
///
/// Holds the configuration, the database and the services wired to it.
pub struct TallyContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub import_service: ImportService,
    pub account_service: AccountService,
}

impl TallyContext {
    /// Open (or create) the database in the tally directory
    pub fn new(tally_dir: &Path) -> Result<Self> {
        let config = Config::load(tally_dir)?;
        std::fs::create_dir_all(tally_dir)?;

        let repository = Arc::new(DuckDbRepository::new(&tally_dir.join(DATABASE_FILE))?);
        repository.ensure_schema()?;

        Ok(Self::with_repository(config, repository))
    }

    /// Wire services to an already opened repository
    pub fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Self {
        let import_service = ImportService::new(
            repository.clone(),
            repository.clone(),
            config.import.clone(),
        );
        let account_service = AccountService::new(repository.clone(), repository.clone());

        Self {
            config,
            repository,
            import_service,
            account_service,
        }
    }
}
