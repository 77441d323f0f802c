//! Import service - CSV statement import
//!
//! Pipeline: decode and tokenize the file, detect or apply a column
//! mapping, parse rows, fingerprint them, then compare against the
//! account's dedup records. Preview stops after the comparison; commit
//! inserts the new rows and their dedup records in one storage batch.

pub mod amount;
pub mod columns;
pub mod dates;
pub mod fingerprint;
pub mod rows;
mod session;
pub mod tokenizer;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::ImportSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{
    ColumnMapping, ColumnMappingDraft, DateFormat, ImportAccount, ParseError, ParsedRow,
    Transaction,
};
use crate::ports::{AccountRegistry, TransactionStore};

pub use rows::ParseOutcome;
pub use session::{ImportSession, ImportStage};
pub use tokenizer::CsvTable;

/// What an uploaded file looks like, before any mapping is confirmed
#[derive(Debug, Clone, Serialize)]
pub struct FilePreview {
    pub headers: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub detected_mapping: ColumnMappingDraft,
    /// Every date format that fits the detected date column, best first
    pub date_format_candidates: Vec<DateFormat>,
    /// More than one format fits; the detected one is a guess
    pub date_format_ambiguous: bool,
    pub total_row_count: usize,
    pub delimiter: char,
    /// 1-indexed line of the header row
    pub header_row: usize,
}

/// A parsed row as shown in a preview
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    #[serde(flatten)]
    pub row: ParsedRow,
    pub fingerprint: String,
    /// Already imported into the account
    pub duplicate: bool,
}

/// Dry run of an import: nothing is written
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    /// The first rows, up to the configured preview limit
    pub transactions: Vec<PreviewRow>,
    /// Successfully parsed rows
    pub total_count: usize,
    pub new_count: usize,
    pub duplicate_count: usize,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    /// Unique batch ID for this import
    pub batch_id: String,
    /// Rows written
    pub imported: usize,
    /// Parsed rows already recorded for the account
    pub skipped: usize,
    /// Rows that could not be parsed
    pub errors: Vec<ParseError>,
}

/// Parse output plus fingerprints and which of them the account already has
struct Checked {
    outcome: ParseOutcome,
    hashes: Vec<String>,
    existing: HashSet<String>,
}

impl Checked {
    fn is_duplicate(&self, idx: usize) -> bool {
        self.existing.contains(&self.hashes[idx])
    }
}

/// Import service for CSV statements
pub struct ImportService {
    accounts: Arc<dyn AccountRegistry>,
    store: Arc<dyn TransactionStore>,
    settings: ImportSettings,
}

impl ImportService {
    pub fn new(
        accounts: Arc<dyn AccountRegistry>,
        store: Arc<dyn TransactionStore>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            accounts,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Inspect a file: headers, sample rows and a best-guess mapping.
    /// No persistence.
    pub fn preview_file(&self, bytes: &[u8]) -> Result<FilePreview> {
        let text = tokenizer::decode(bytes)?;
        let delimiter = tokenizer::sniff_delimiter(&text);
        let records = tokenizer::records(&text, delimiter);
        let header_row = columns::detect_header_row(&records);
        let table = CsvTable::from_records(records, header_row, delimiter)?;

        let mut detected = columns::detect_columns(&table.headers);
        detected.skip_header_rows = header_row;

        let candidates = match detected.date_column.as_deref() {
            Some(date_column) => self.date_candidates(&table, date_column),
            None => Vec::new(),
        };
        detected.date_format = candidates.first().copied();

        tracing::debug!(
            rows = table.rows.len(),
            columns = table.headers.len(),
            header_row,
            delimiter = %delimiter.escape_debug(),
            date_formats = candidates.len(),
            "previewed file"
        );

        Ok(FilePreview {
            sample_rows: table
                .rows
                .iter()
                .take(self.settings.sample_rows)
                .cloned()
                .collect(),
            total_row_count: table.rows.len(),
            date_format_ambiguous: candidates.len() > 1,
            date_format_candidates: candidates,
            detected_mapping: detected,
            headers: table.headers,
            delimiter,
            header_row,
        })
    }

    /// Formats accepted by the whole date column, or failing that by the
    /// sample rows alone (a trailing summary line should not block detection)
    fn date_candidates(&self, table: &CsvTable, date_column: &str) -> Vec<DateFormat> {
        let Some(idx) = crate::domain::mapping::header_index(&table.headers, date_column) else {
            return Vec::new();
        };
        let values: Vec<&str> = table.rows.iter().map(|r| CsvTable::cell(r, idx)).collect();
        let all = dates::detect_candidates(&values);
        if !all.is_empty() {
            return all;
        }
        let sample = values.len().min(self.settings.sample_rows.max(1));
        dates::detect_candidates(&values[..sample])
    }

    /// Dry run with an explicit mapping. With an account, rows already
    /// imported into it are counted as duplicates.
    pub fn preview_import(
        &self,
        bytes: &[u8],
        mapping: &ColumnMapping,
        account_id: Option<Uuid>,
    ) -> Result<ImportPreview> {
        if let Some(id) = account_id {
            self.require_account(id)?;
        }
        let checked = self.check(bytes, mapping, account_id)?;

        let transactions = checked
            .outcome
            .transactions
            .iter()
            .enumerate()
            .take(self.settings.preview_limit)
            .map(|(i, row)| PreviewRow {
                row: row.clone(),
                fingerprint: checked.hashes[i].clone(),
                duplicate: checked.is_duplicate(i),
            })
            .collect();

        let total_count = checked.outcome.transactions.len();
        let duplicate_count = (0..total_count).filter(|i| checked.is_duplicate(*i)).count();

        tracing::info!(
            total = total_count,
            duplicates = duplicate_count,
            errors = checked.outcome.errors.len(),
            "import preview"
        );

        Ok(ImportPreview {
            transactions,
            total_count,
            new_count: total_count - duplicate_count,
            duplicate_count,
            errors: checked.outcome.errors,
        })
    }

    /// Commit a file into an account using the account's saved mapping
    pub fn commit_import(&self, bytes: &[u8], account_id: Uuid) -> Result<ImportResult> {
        let account = self.require_account(account_id)?;
        let mapping = account
            .mapping
            .ok_or_else(|| Error::NoSavedMapping(account_id.to_string()))?;
        self.commit_with_mapping(bytes, account_id, &mapping)
    }

    fn commit_with_mapping(
        &self,
        bytes: &[u8],
        account_id: Uuid,
        mapping: &ColumnMapping,
    ) -> Result<ImportResult> {
        let checked = self.check(bytes, mapping, Some(account_id))?;
        let batch_id = Uuid::new_v4().to_string();

        let fresh: Vec<Transaction> = checked
            .outcome
            .transactions
            .iter()
            .enumerate()
            .filter(|(i, _)| !checked.is_duplicate(*i))
            .map(|(i, row)| {
                Transaction::from_parsed(account_id, row, checked.hashes[i].clone(), &batch_id)
            })
            .collect();

        let inserted = if fresh.is_empty() {
            Vec::new()
        } else {
            self.store.insert_batch(account_id, &fresh)?
        };
        let imported = inserted.len();
        let skipped = checked.outcome.transactions.len() - imported;

        // The batch is already durable; a failed timestamp update must not
        // report the import as failed
        if let Err(e) = self.accounts.touch_last_synced(account_id, Utc::now()) {
            tracing::warn!(account_id = %account_id, error = %e, "failed to update last synced time");
        }

        tracing::info!(
            batch_id = %batch_id,
            imported,
            skipped,
            errors = checked.outcome.errors.len(),
            "import committed"
        );

        Ok(ImportResult {
            batch_id,
            imported,
            skipped,
            errors: checked.outcome.errors,
        })
    }

    /// Parse, fingerprint and look up existing hashes
    fn check(
        &self,
        bytes: &[u8],
        mapping: &ColumnMapping,
        account_id: Option<Uuid>,
    ) -> Result<Checked> {
        let table = load_table(bytes, mapping.skip_header_rows)?;
        let outcome = rows::parse_all(&table, mapping)?;
        let hashes = fingerprint::fingerprint_rows(&outcome.transactions);
        let existing = match account_id {
            Some(id) => self.store.existing_hashes(id, &hashes)?,
            None => HashSet::new(),
        };
        Ok(Checked {
            outcome,
            hashes,
            existing,
        })
    }

    fn require_account(&self, id: Uuid) -> Result<ImportAccount> {
        self.accounts
            .get_account(id)?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    // === Sessions ===

    /// Upload: tokenize the file and pick the first stage.
    ///
    /// File-level problems fail here. With an account whose saved mapping
    /// fits the file, the session goes straight to Preview.
    pub fn start_session(&self, bytes: Vec<u8>, account_id: Option<Uuid>) -> Result<ImportSession> {
        let file = self.preview_file(&bytes)?;

        let saved = match account_id {
            Some(id) => self.require_account(id)?.mapping,
            None => None,
        };

        let stage = match saved {
            Some(mapping) => {
                let missing = match load_table(&bytes, mapping.skip_header_rows) {
                    Ok(table) => mapping.missing_columns(&table.headers),
                    Err(e) if e.is_file_level() => mapping
                        .configured_columns()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    Err(e) => return Err(e),
                };
                if missing.is_empty() {
                    tracing::debug!("saved mapping fits, skipping mapping step");
                    let preview = self.preview_import(&bytes, &mapping, account_id)?;
                    ImportStage::Preview { mapping, preview }
                } else {
                    tracing::info!(missing = missing.len(), "saved mapping does not fit file");
                    ImportStage::Mapping {
                        detected: file.detected_mapping.clone(),
                        missing_columns: missing,
                    }
                }
            }
            None => ImportStage::Mapping {
                detected: file.detected_mapping.clone(),
                missing_columns: Vec::new(),
            },
        };

        Ok(ImportSession::new(bytes, account_id, file, stage))
    }

    /// Validate a mapping and preview with it. On error the session keeps
    /// its current stage.
    pub fn confirm_mapping(
        &self,
        session: &mut ImportSession,
        draft: &ColumnMappingDraft,
    ) -> Result<()> {
        if session.is_committed() {
            return Err(Error::validation("import session is already committed"));
        }
        let mapping = draft.validate()?;
        let preview = self.preview_import(&session.bytes, &mapping, session.account_id)?;
        session.stage = ImportStage::Preview { mapping, preview };
        Ok(())
    }

    /// Commit a previewed session. A confirmed mapping that differs from
    /// the account's saved one is saved first.
    pub fn commit_session(&self, session: &mut ImportSession) -> Result<ImportResult> {
        let mapping = match &session.stage {
            ImportStage::Preview { mapping, .. } => mapping.clone(),
            ImportStage::Mapping { .. } => {
                return Err(Error::validation("confirm a column mapping before committing"))
            }
            ImportStage::Result(_) => {
                return Err(Error::validation("import session is already committed"))
            }
        };
        let account_id = session
            .account_id
            .ok_or_else(|| Error::validation("an account is required to commit an import"))?;

        let account = self.require_account(account_id)?;
        if account.mapping.as_ref() != Some(&mapping) {
            self.accounts.update_mapping(account_id, &mapping)?;
            tracing::info!(account_id = %account_id, "saved column mapping");
        }

        let result = self.commit_with_mapping(&session.bytes, account_id, &mapping)?;
        session.stage = ImportStage::Result(result.clone());
        Ok(result)
    }
}

/// Decode and tokenize, with the header on line `skip_header_rows`
fn load_table(bytes: &[u8], skip_header_rows: usize) -> Result<CsvTable> {
    let text = tokenizer::decode(bytes)?;
    tokenizer::tokenize(&text)?.with_header_at(skip_header_rows)
}
