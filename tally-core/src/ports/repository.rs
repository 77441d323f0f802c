//! Storage ports used by the import pipeline

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{ColumnMapping, DedupRecord, ImportAccount, Transaction};

/// Account registry: owns accounts and their saved column mappings
///
/// Accounts are created once and afterwards change only through
/// [`update_mapping`](AccountRegistry::update_mapping) and
/// [`touch_last_synced`](AccountRegistry::touch_last_synced).
pub trait AccountRegistry: Send + Sync {
    /// Store a new account
    fn create_account(&self, account: &ImportAccount) -> Result<()>;

    /// Get account by ID
    fn get_account(&self, id: Uuid) -> Result<Option<ImportAccount>>;

    /// All accounts, oldest first
    fn list_accounts(&self) -> Result<Vec<ImportAccount>>;

    /// Replace the saved mapping. Fails with `NotFound` for an unknown account.
    fn update_mapping(&self, id: Uuid, mapping: &ColumnMapping) -> Result<()>;

    /// Record a successful commit time
    fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Transaction store plus the per-account dedup table
pub trait TransactionStore: Send + Sync {
    /// Which of `hashes` are already recorded for the account
    fn existing_hashes(&self, account_id: Uuid, hashes: &[String]) -> Result<HashSet<String>>;

    /// Insert transactions and their dedup records in one atomic unit.
    ///
    /// A transaction whose fingerprint is already recorded for the account
    /// (for example, inserted by a concurrent commit) is skipped, not
    /// duplicated. Returns the transactions actually inserted. On error
    /// nothing is written.
    fn insert_batch(&self, account_id: Uuid, transactions: &[Transaction]) -> Result<Vec<Uuid>>;

    /// Stored transactions for an account, by date then insertion order
    fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>>;

    /// Dedup records for an account
    fn dedup_records(&self, account_id: Uuid) -> Result<Vec<DedupRecord>>;
}
