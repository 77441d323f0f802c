//! DuckDB repository implementation

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    ColumnMapping, DedupRecord, ImportAccount, Transaction, TransactionKind, TransactionStatus,
};
use crate::ports::{AccountRegistry, TransactionStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
        || lower.contains("file is already open")
}

/// DuckDB-backed account registry and transaction store
///
/// One connection behind a mutex; every batch insert runs in a single
/// database transaction while holding it.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) the database file.
    ///
    /// Retries with exponential backoff on file locking errors, which occur
    /// when another tally process holds the database.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// In-memory database, used for dry runs and tests
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Autoloading can pick up cached extensions built for another platform
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Database file path; None for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of stored transactions for an account
    pub fn count_transactions(&self, account_id: Uuid) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE account_id = ?",
            params![account_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// === Accounts ===

const ACCOUNT_COLUMNS: &str =
    "account_id, name, institution, column_mapping, last_synced_at, created_at, updated_at";

/// Raw column values, converted outside the row callback so conversion
/// errors surface as crate errors
struct AccountRow {
    id: String,
    name: String,
    institution: Option<String>,
    mapping: Option<String>,
    last_synced_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AccountRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            institution: row.get(2)?,
            mapping: row.get(3)?,
            last_synced_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_account(self) -> Result<ImportAccount> {
        let id = parse_uuid(&self.id)?;
        let mapping = match self.mapping.as_deref() {
            Some(json) => match serde_json::from_str::<ColumnMapping>(json) {
                Ok(mapping) => Some(mapping),
                Err(e) => {
                    // Treated as unmapped so the next import asks for a new mapping
                    tracing::warn!(account_id = %id, error = %e, "ignoring invalid saved mapping");
                    None
                }
            },
            None => None,
        };
        Ok(ImportAccount {
            id,
            name: self.name,
            institution: self.institution,
            mapping,
            last_synced_at: self.last_synced_at.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl AccountRegistry for DuckDbRepository {
    fn create_account(&self, account: &ImportAccount) -> Result<()> {
        let mapping = account
            .mapping
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO import_accounts ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                ACCOUNT_COLUMNS
            ),
            params![
                account.id.to_string(),
                account.name,
                account.institution,
                mapping,
                account.last_synced_at.map(|t| t.to_rfc3339()),
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> Result<Option<ImportAccount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_accounts WHERE account_id = ?",
            ACCOUNT_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id.to_string()], AccountRow::read)?;
        match rows.next() {
            Some(row) => Ok(Some(row?.into_account()?)),
            None => Ok(None),
        }
    }

    fn list_accounts(&self) -> Result<Vec<ImportAccount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_accounts ORDER BY created_at, name",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map([], AccountRow::read)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?.into_account()?);
        }
        Ok(accounts)
    }

    fn update_mapping(&self, id: Uuid, mapping: &ColumnMapping) -> Result<()> {
        let json = serde_json::to_string(mapping)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE import_accounts SET column_mapping = ?, updated_at = ? WHERE account_id = ?",
            params![json, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("account {}", id)));
        }
        Ok(())
    }

    fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE import_accounts SET last_synced_at = ? WHERE account_id = ?",
            params![at.to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("account {}", id)));
        }
        Ok(())
    }
}

// === Transactions and dedup records ===

struct TransactionRow {
    id: String,
    account_id: String,
    date: String,
    amount: String,
    kind: String,
    description: String,
    merchant: Option<String>,
    status: Option<String>,
    fingerprint: String,
    batch_id: String,
    created_at: String,
}

impl TransactionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            date: row.get(2)?,
            amount: row.get(3)?,
            kind: row.get(4)?,
            description: row.get(5)?,
            merchant: row.get(6)?,
            status: row.get(7)?,
            fingerprint: row.get(8)?,
            batch_id: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction> {
        let kind = TransactionKind::parse(&self.kind)
            .ok_or_else(|| Error::database(format!("unknown transaction kind '{}'", self.kind)))?;
        Ok(Transaction {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            date: NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
                .map_err(|e| Error::database(format!("bad stored date '{}': {}", self.date, e)))?,
            amount: Decimal::from_str(&self.amount)
                .map_err(|e| Error::database(format!("bad stored amount '{}': {}", self.amount, e)))?,
            kind,
            description: self.description,
            merchant: self.merchant,
            status: self.status.as_deref().and_then(TransactionStatus::from_raw),
            fingerprint: self.fingerprint,
            batch_id: self.batch_id,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl TransactionStore for DuckDbRepository {
    fn existing_hashes(&self, account_id: Uuid, hashes: &[String]) -> Result<HashSet<String>> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT hash FROM dedup_records WHERE account_id = ?")?;
        let rows = stmt.query_map(params![account_id.to_string()], |row| row.get::<_, String>(0))?;

        let mut found = HashSet::new();
        for hash in rows {
            let hash = hash?;
            if wanted.contains(hash.as_str()) {
                found.insert(hash);
            }
        }
        Ok(found)
    }

    fn insert_batch(&self, account_id: Uuid, transactions: &[Transaction]) -> Result<Vec<Uuid>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = Vec::with_capacity(transactions.len());

        for t in transactions {
            if t.account_id != account_id {
                return Err(Error::validation(format!(
                    "transaction {} belongs to account {}, not {}",
                    t.id, t.account_id, account_id
                )));
            }

            // Claim the fingerprint first; a conflict means another commit got there
            let claimed = tx.execute(
                "INSERT INTO dedup_records (account_id, hash, transaction_id, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT DO NOTHING",
                params![
                    account_id.to_string(),
                    t.fingerprint,
                    t.id.to_string(),
                    t.created_at.to_rfc3339(),
                ],
            )?;
            if claimed == 0 {
                continue;
            }

            tx.execute(
                "INSERT INTO transactions (transaction_id, account_id, transaction_date, amount, kind,
                                           description, merchant, status, fingerprint, batch_id, created_at)
                 VALUES (?, ?, CAST(? AS DATE), CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, ?, ?, ?)",
                params![
                    t.id.to_string(),
                    account_id.to_string(),
                    t.date.format("%Y-%m-%d").to_string(),
                    t.amount.to_string(),
                    t.kind.as_str(),
                    t.description,
                    t.merchant,
                    t.status.map(|s| s.as_str()),
                    t.fingerprint,
                    t.batch_id,
                    t.created_at.to_rfc3339(),
                ],
            )?;
            inserted.push(t.id);
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT transaction_id, account_id, transaction_date::VARCHAR, amount::VARCHAR, kind,
                    description, merchant, status, fingerprint, batch_id, created_at
             FROM transactions
             WHERE account_id = ?
             ORDER BY transaction_date, seq",
        )?;
        let rows = stmt.query_map(params![account_id.to_string()], TransactionRow::read)?;
        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }
        Ok(transactions)
    }

    fn dedup_records(&self, account_id: Uuid) -> Result<Vec<DedupRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, hash, transaction_id, created_at
             FROM dedup_records
             WHERE account_id = ?
             ORDER BY created_at, hash",
        )?;
        let rows = stmt.query_map(params![account_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (account, hash, transaction_id, created_at) = row?;
            records.push(DedupRecord {
                account_id: parse_uuid(&account)?,
                hash,
                transaction_id: transaction_id.as_deref().map(parse_uuid).transpose()?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(records)
    }
}

// Helper functions

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("bad stored id '{}': {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("bad stored timestamp '{}': {}", s, e)))
}
