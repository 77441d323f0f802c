//! In-process store
//!
//! Same contract as the DuckDB adapter, kept in memory. Used by tests and
//! for dry runs where nothing should touch disk.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{ColumnMapping, DedupRecord, ImportAccount, Transaction};
use crate::ports::{AccountRegistry, TransactionStore};

#[derive(Default)]
struct State {
    accounts: Vec<ImportAccount>,
    transactions: Vec<Transaction>,
    dedup: HashMap<(Uuid, String), DedupRecord>,
}

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
    fail_next_insert: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `insert_batch` fail before writing anything
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

impl AccountRegistry for MemoryRepository {
    fn create_account(&self, account: &ImportAccount) -> Result<()> {
        let mut state = self.lock()?;
        if state.accounts.iter().any(|a| a.id == account.id) {
            return Err(Error::database(format!("account {} already exists", account.id)));
        }
        state.accounts.push(account.clone());
        Ok(())
    }

    fn get_account(&self, id: Uuid) -> Result<Option<ImportAccount>> {
        Ok(self.lock()?.accounts.iter().find(|a| a.id == id).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<ImportAccount>> {
        Ok(self.lock()?.accounts.clone())
    }

    fn update_mapping(&self, id: Uuid, mapping: &ColumnMapping) -> Result<()> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
        account.mapping = Some(mapping.clone());
        account.updated_at = Utc::now();
        Ok(())
    }

    fn touch_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::not_found(format!("account {}", id)))?;
        account.last_synced_at = Some(at);
        Ok(())
    }
}

impl TransactionStore for MemoryRepository {
    fn existing_hashes(&self, account_id: Uuid, hashes: &[String]) -> Result<HashSet<String>> {
        let state = self.lock()?;
        Ok(hashes
            .iter()
            .filter(|h| state.dedup.contains_key(&(account_id, (*h).clone())))
            .cloned()
            .collect())
    }

    fn insert_batch(&self, account_id: Uuid, transactions: &[Transaction]) -> Result<Vec<Uuid>> {
        let mut state = self.lock()?;
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(Error::database("simulated storage failure"));
        }

        // Stage everything first so a validation failure leaves no trace
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut staged = Vec::new();
        for t in transactions {
            if t.account_id != account_id {
                return Err(Error::validation(format!(
                    "transaction {} belongs to account {}, not {}",
                    t.id, t.account_id, account_id
                )));
            }
            let key = (account_id, t.fingerprint.clone());
            if state.dedup.contains_key(&key) || !claimed.insert(t.fingerprint.as_str()) {
                continue;
            }
            staged.push(t);
        }

        let mut inserted = Vec::with_capacity(staged.len());
        for t in staged {
            state.dedup.insert(
                (account_id, t.fingerprint.clone()),
                DedupRecord {
                    account_id,
                    hash: t.fingerprint.clone(),
                    transaction_id: Some(t.id),
                    created_at: t.created_at,
                },
            );
            state.transactions.push(t.clone());
            inserted.push(t.id);
        }
        Ok(inserted)
    }

    fn transactions_for_account(&self, account_id: Uuid) -> Result<Vec<Transaction>> {
        let state = self.lock()?;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within a day
        transactions.sort_by_key(|t| t.date);
        Ok(transactions)
    }

    fn dedup_records(&self, account_id: Uuid) -> Result<Vec<DedupRecord>> {
        let state = self.lock()?;
        let mut records: Vec<DedupRecord> = state
            .dedup
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.hash.cmp(&b.hash)));
        Ok(records)
    }
}
