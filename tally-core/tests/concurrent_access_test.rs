//! Concurrent import tests
//!
//! Several threads commit into one shared repository. The dedup key on
//! (account_id, hash) must keep every transaction single.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::config::ImportSettings;
use tally_core::ports::TransactionStore;
use tally_core::services::{AccountService, ImportService};
use tally_core::{ColumnMapping, DateFormat};

/// Number of concurrent threads
const THREAD_COUNT: usize = 6;

fn statement(rows: usize) -> String {
    let mut text = String::from("Date,Description,Amount\n");
    for i in 0..rows {
        text.push_str(&format!("2024-01-{:02},Purchase {},-{}.25\n", i % 28 + 1, i, i + 1));
    }
    text
}

#[test]
fn test_concurrent_commits_of_same_file() {
    let temp_dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&temp_dir.path().join("test_concurrent.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    let repo = Arc::new(repo);

    let mapping = ColumnMapping::single("Date", DateFormat::YearMonthDayDash, "Amount").unwrap();
    let account_id = AccountService::new(repo.clone(), repo.clone())
        .create_account("Checking", None, Some(mapping))
        .unwrap();

    let service = Arc::new(ImportService::new(
        repo.clone(),
        repo.clone(),
        ImportSettings::default(),
    ));
    let text = Arc::new(statement(40));
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let service = Arc::clone(&service);
            let text = Arc::clone(&text);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.commit_import(text.as_bytes(), account_id)
            })
        })
        .collect();

    let mut imported = 0;
    for handle in handles {
        let result = handle.join().unwrap().expect("commit should succeed");
        assert_eq!(result.imported + result.skipped, 40);
        imported += result.imported;
    }

    println!("Imported across {} threads: {}", THREAD_COUNT, imported);
    assert_eq!(imported, 40, "each row must be inserted exactly once");
    assert_eq!(repo.count_transactions(account_id).unwrap(), 40);
    assert_eq!(repo.dedup_records(account_id).unwrap().len(), 40);
}

#[test]
fn test_concurrent_commits_into_different_accounts() {
    let temp_dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&temp_dir.path().join("test_accounts.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    let repo = Arc::new(repo);

    let accounts = AccountService::new(repo.clone(), repo.clone());
    let mapping = ColumnMapping::single("Date", DateFormat::YearMonthDayDash, "Amount").unwrap();
    let ids: Vec<_> = (0..THREAD_COUNT)
        .map(|i| {
            accounts
                .create_account(&format!("Account {}", i), None, Some(mapping.clone()))
                .unwrap()
        })
        .collect();

    let service = Arc::new(ImportService::new(
        repo.clone(),
        repo.clone(),
        ImportSettings::default(),
    ));
    let text = Arc::new(statement(10));

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let service = Arc::clone(&service);
            let text = Arc::clone(&text);
            thread::spawn(move || service.commit_import(text.as_bytes(), id))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap().imported, 10);
    }
    for id in ids {
        assert_eq!(repo.count_transactions(id).unwrap(), 10);
    }
}
