//! Integration tests for the import pipeline
//!
//! These run the full pipeline against a real DuckDB file in a temp dir.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use tally_core::adapters::duckdb::DuckDbRepository;
use tally_core::config::ImportSettings;
use tally_core::domain::{AmountMode, TransactionKind};
use tally_core::ports::TransactionStore;
use tally_core::services::{AccountService, ImportService, ImportStage};
use tally_core::{ColumnMapping, ColumnMappingDraft, DateFormat, Error};

// ============================================================================
// Test Helpers
// ============================================================================

const STATEMENT: &str = "Date,Description,Amount\n\
                         2024-01-05,Coffee Shop,-4.50\n\
                         2024-01-06,Paycheck,2000.00\n";

struct Harness {
    _dir: TempDir,
    repo: Arc<DuckDbRepository>,
    imports: ImportService,
    accounts: AccountService,
}

/// Create a test repository with schema initialized
fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let repo = DuckDbRepository::new(&dir.path().join("test.duckdb"))
        .expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    let repo = Arc::new(repo);
    Harness {
        imports: ImportService::new(repo.clone(), repo.clone(), ImportSettings::default()),
        accounts: AccountService::new(repo.clone(), repo.clone()),
        repo,
        _dir: dir,
    }
}

fn iso_mapping() -> ColumnMapping {
    ColumnMapping::single("Date", DateFormat::YearMonthDayDash, "Amount").unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_end_to_end_statement() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();

    let preview = h
        .imports
        .preview_import(STATEMENT.as_bytes(), &iso_mapping(), Some(account_id))
        .unwrap();
    assert!(preview.errors.is_empty());
    assert_eq!(preview.total_count, 2);

    let coffee = &preview.transactions[0].row;
    assert_eq!(coffee.date, date(2024, 1, 5));
    assert_eq!(coffee.amount, Decimal::new(450, 2));
    assert_eq!(coffee.kind, TransactionKind::Expense);
    assert_eq!(coffee.description, "Coffee Shop");

    let pay = &preview.transactions[1].row;
    assert_eq!(pay.date, date(2024, 1, 6));
    assert_eq!(pay.amount, Decimal::new(200000, 2));
    assert_eq!(pay.kind, TransactionKind::Income);
    assert_eq!(pay.description, "Paycheck");

    let result = h.imports.commit_import(STATEMENT.as_bytes(), account_id).unwrap();
    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped, 0);
    assert!(result.errors.is_empty());

    let stored = h.repo.transactions_for_account(account_id).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].description, "Coffee Shop");
    assert_eq!(stored[0].signed_amount(), Decimal::new(-450, 2));
    assert_eq!(stored[1].kind, TransactionKind::Income);
    assert!(stored.iter().all(|t| t.batch_id == result.batch_id));

    let dedup = h.repo.dedup_records(account_id).unwrap();
    assert_eq!(dedup.len(), 2);
    assert!(dedup.iter().all(|r| r.transaction_id.is_some()));

    let account = h.accounts.get_account(account_id).unwrap();
    assert!(account.last_synced_at.is_some());
}

// ============================================================================
// Deduplication
// ============================================================================

#[test]
fn test_reimport_is_idempotent() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();

    h.imports.commit_import(STATEMENT.as_bytes(), account_id).unwrap();
    let again = h.imports.commit_import(STATEMENT.as_bytes(), account_id).unwrap();

    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 2);
    assert_eq!(h.repo.count_transactions(account_id).unwrap(), 2);
    assert_eq!(h.repo.dedup_records(account_id).unwrap().len(), 2);
}

#[test]
fn test_overlapping_statements() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();

    let january = "Date,Amount\n2024-01-01,-10\n2024-01-02,-20\n2024-01-03,-30\n";
    let overlap = "Date,Amount\n2024-01-02,-20\n2024-01-03,-30\n2024-01-04,-40\n";

    let first = h.imports.commit_import(january.as_bytes(), account_id).unwrap();
    assert_eq!(first.imported, 3);

    let preview = h
        .imports
        .preview_import(overlap.as_bytes(), &iso_mapping(), Some(account_id))
        .unwrap();
    assert_eq!(preview.new_count, 1);
    assert_eq!(preview.duplicate_count, 2);

    let second = h.imports.commit_import(overlap.as_bytes(), account_id).unwrap();
    assert_eq!((second.imported, second.skipped), (1, 2));

    let dates: Vec<NaiveDate> = h
        .repo
        .transactions_for_account(account_id)
        .unwrap()
        .iter()
        .map(|t| t.date)
        .collect();
    assert_eq!(
        dates,
        vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)]
    );
}

#[test]
fn test_dedup_is_per_account() {
    let h = harness();
    let checking = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();
    let savings = h
        .accounts
        .create_account("Savings", None, Some(iso_mapping()))
        .unwrap();

    h.imports.commit_import(STATEMENT.as_bytes(), checking).unwrap();
    let other = h.imports.commit_import(STATEMENT.as_bytes(), savings).unwrap();
    assert_eq!(other.imported, 2);
}

#[test]
fn test_format_variations_hash_alike() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();
    h.imports.commit_import(STATEMENT.as_bytes(), account_id).unwrap();

    // Same transactions exported by a different tool: spacing, case, currency
    let reformatted = "Date,Description,Amount\n\
                       2024-01-05,\"  coffee   SHOP \",$-4.5\n\
                       2024-01-06,PAYCHECK,\"2,000.00\"\n";
    let result = h.imports.commit_import(reformatted.as_bytes(), account_id).unwrap();
    assert_eq!(result.imported, 0);
    assert_eq!(result.skipped, 2);
}

// ============================================================================
// Row independence
// ============================================================================

#[test]
fn test_bad_rows_do_not_block_good_rows() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();

    let text = "Date,Amount\n\
                2024-01-01,-10\n\
                not a date,-20\n\
                2024-01-03,abc\n\
                2024-01-04,\n\
                2024-01-05,-50\n";
    let result = h.imports.commit_import(text.as_bytes(), account_id).unwrap();

    assert_eq!(result.imported, 2);
    assert_eq!(result.errors.len(), 3);
    let failed: Vec<usize> = result.errors.iter().map(|e| e.row_number).collect();
    assert_eq!(failed, vec![2, 3, 4]);
    assert_eq!(h.repo.count_transactions(account_id).unwrap(), 2);
}

// ============================================================================
// Saved mappings and sessions
// ============================================================================

#[test]
fn test_session_saves_mapping_for_next_import() {
    let h = harness();
    let account_id = h.accounts.create_account("Card", Some("First Bank"), None).unwrap();

    let text = "Posting Date,Details,Money Out,Money In\n\
                15/01/2024,Groceries,52.10,\n\
                16/01/2024,Refund,,12.00\n";

    let mut session = h.imports.start_session(text.as_bytes().to_vec(), Some(account_id)).unwrap();
    let detected = match &session.stage {
        ImportStage::Mapping { detected, .. } => detected.clone(),
        other => panic!("expected mapping stage, got {}", other.name()),
    };
    assert_eq!(detected.amount_mode, Some(AmountMode::Split));
    assert_eq!(detected.date_format, Some(DateFormat::DayMonthYearSlash));

    h.imports.confirm_mapping(&mut session, &detected).unwrap();
    let result = h.imports.commit_session(&mut session).unwrap();
    assert_eq!(result.imported, 2);

    let stored = h.repo.transactions_for_account(account_id).unwrap();
    assert_eq!(stored[0].signed_amount(), Decimal::new(-5210, 2));
    assert_eq!(stored[1].signed_amount(), Decimal::new(1200, 2));

    // Next month's file skips the mapping step
    let next = "Posting Date,Details,Money Out,Money In\n\
                15/02/2024,Groceries,48.00,\n";
    let session = h.imports.start_session(next.as_bytes().to_vec(), Some(account_id)).unwrap();
    assert_eq!(session.stage.name(), "preview");
    assert_eq!(session.preview().unwrap().new_count, 1);
}

#[test]
fn test_changed_export_requires_remapping() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();

    let renamed = "Booking Date,Text,Value\n2024-03-01,Rent,-900\n";
    assert!(matches!(
        h.imports.commit_import(renamed.as_bytes(), account_id),
        Err(Error::MissingColumns(_))
    ));

    let mut session = h
        .imports
        .start_session(renamed.as_bytes().to_vec(), Some(account_id))
        .unwrap();
    match &session.stage {
        ImportStage::Mapping { missing_columns, .. } => {
            assert_eq!(missing_columns, &vec!["Date".to_string(), "Amount".to_string()]);
        }
        other => panic!("expected mapping stage, got {}", other.name()),
    }

    let draft = ColumnMappingDraft {
        date_column: Some("Booking Date".into()),
        amount_column: Some("Value".into()),
        description_column: Some("Text".into()),
        ..iso_mapping().to_draft()
    };
    h.imports.confirm_mapping(&mut session, &draft).unwrap();
    h.imports.commit_session(&mut session).unwrap();

    let saved = h.accounts.get_account(account_id).unwrap().mapping.unwrap();
    assert_eq!(saved.date_column, "Booking Date");
}

#[test]
fn test_commit_without_mapping_fails() {
    let h = harness();
    let account_id = h.accounts.create_account("Checking", None, None).unwrap();
    assert!(matches!(
        h.imports.commit_import(STATEMENT.as_bytes(), account_id),
        Err(Error::NoSavedMapping(_))
    ));
    assert!(matches!(
        h.imports.commit_import(STATEMENT.as_bytes(), Uuid::new_v4()),
        Err(Error::NotFound(_))
    ));
    assert_eq!(h.repo.count_transactions(account_id).unwrap(), 0);
}

#[test]
fn test_summary_after_imports() {
    let h = harness();
    let account_id = h
        .accounts
        .create_account("Checking", None, Some(iso_mapping()))
        .unwrap();
    h.imports.commit_import(STATEMENT.as_bytes(), account_id).unwrap();
    h.imports
        .commit_import(b"Date,Amount\n2024-02-01,-1.00\n", account_id)
        .unwrap();

    let summary = h.accounts.summary(account_id).unwrap();
    assert_eq!(summary.transaction_count, 3);
    assert_eq!(summary.batch_count, 2);
    assert_eq!(summary.fingerprint_count, 3);
    assert_eq!(summary.date_range.earliest, Some(date(2024, 1, 5)));
    assert_eq!(summary.date_range.latest, Some(date(2024, 2, 1)));
}
