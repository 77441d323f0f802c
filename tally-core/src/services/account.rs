//! Account service - import accounts and their saved mappings

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{ColumnMapping, ImportAccount, Transaction};
use crate::ports::{AccountRegistry, TransactionStore};

pub struct AccountService {
    accounts: Arc<dyn AccountRegistry>,
    store: Arc<dyn TransactionStore>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRegistry>, store: Arc<dyn TransactionStore>) -> Self {
        Self { accounts, store }
    }

    /// Create an account, optionally with a mapping for its first import
    pub fn create_account(
        &self,
        name: &str,
        institution: Option<&str>,
        mapping: Option<ColumnMapping>,
    ) -> Result<Uuid> {
        let mut account = ImportAccount::new(Uuid::new_v4(), name.trim());
        account.institution = institution.map(|i| i.trim().to_string());
        account.mapping = mapping;
        account.validate().map_err(Error::validation)?;

        self.accounts.create_account(&account)?;
        tracing::info!(account_id = %account.id, "account created");
        Ok(account.id)
    }

    /// Replace the saved mapping. Used when the user explicitly re-maps.
    pub fn update_account_mapping(&self, id: Uuid, mapping: &ColumnMapping) -> Result<()> {
        self.accounts.update_mapping(id, mapping)?;
        tracing::info!(account_id = %id, "account mapping updated");
        Ok(())
    }

    pub fn get_account(&self, id: Uuid) -> Result<ImportAccount> {
        self.accounts
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    pub fn list_accounts(&self) -> Result<Vec<ImportAccount>> {
        self.accounts.list_accounts()
    }

    /// Stored transactions, by date
    pub fn transactions(&self, id: Uuid) -> Result<Vec<Transaction>> {
        self.get_account(id)?;
        self.store.transactions_for_account(id)
    }

    /// Account details plus what has been imported into it
    pub fn summary(&self, id: Uuid) -> Result<AccountSummary> {
        let account = self.get_account(id)?;
        let transactions = self.store.transactions_for_account(id)?;
        let fingerprint_count = self.store.dedup_records(id)?.len();

        Ok(AccountSummary {
            date_range: DateRange {
                earliest: transactions.iter().map(|t| t.date).min(),
                latest: transactions.iter().map(|t| t.date).max(),
            },
            transaction_count: transactions.len(),
            batch_count: {
                let mut batches: Vec<&str> = transactions.iter().map(|t| t.batch_id.as_str()).collect();
                batches.sort_unstable();
                batches.dedup();
                batches.len()
            },
            fingerprint_count,
            account,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub account: ImportAccount,
    pub transaction_count: usize,
    pub batch_count: usize,
    pub fingerprint_count: usize,
    pub date_range: DateRange,
}

#[derive(Debug, Serialize)]
pub struct DateRange {
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRepository;
    use crate::domain::DateFormat;

    fn service() -> AccountService {
        let repo = Arc::new(MemoryRepository::new());
        AccountService::new(repo.clone(), repo)
    }

    #[test]
    fn test_create_and_get() {
        let service = service();
        let id = service.create_account(" Checking ", Some("First Bank"), None).unwrap();

        let account = service.get_account(id).unwrap();
        assert_eq!(account.name, "Checking");
        assert_eq!(account.institution.as_deref(), Some("First Bank"));
        assert!(account.mapping.is_none());
        assert_eq!(service.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_name_rejected() {
        let service = service();
        assert!(matches!(
            service.create_account("  ", None, None),
            Err(Error::Validation(_))
        ));
        assert!(service.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_update_mapping() {
        let service = service();
        let id = service.create_account("Card", None, None).unwrap();
        let mapping = ColumnMapping::single("Date", DateFormat::DayMonthYearDot, "Betrag").unwrap();

        service.update_account_mapping(id, &mapping).unwrap();
        assert_eq!(service.get_account(id).unwrap().mapping, Some(mapping.clone()));

        assert!(matches!(
            service.update_account_mapping(Uuid::new_v4(), &mapping),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_summary_of_empty_account() {
        let service = service();
        let id = service.create_account("Savings", None, None).unwrap();
        let summary = service.summary(id).unwrap();
        assert_eq!(summary.transaction_count, 0);
        assert_eq!(summary.batch_count, 0);
        assert!(summary.date_range.earliest.is_none());

        assert!(matches!(service.summary(Uuid::new_v4()), Err(Error::NotFound(_))));
    }
}
