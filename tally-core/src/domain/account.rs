//! Import account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mapping::ColumnMapping;

/// A named ledger account that statements are imported into
///
/// The saved mapping lets later imports from the same bank skip the mapping
/// step when the file still has the expected columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAccount {
    pub id: Uuid,
    pub name: String,
    pub institution: Option<String>,
    /// Null until the first confirmed mapping
    pub mapping: Option<ColumnMapping>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportAccount {
    /// Create a new account with required fields
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            institution: None,
            mapping: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate account data
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("account name cannot be empty");
        }
        if matches!(&self.institution, Some(i) if i.trim().is_empty()) {
            return Err("institution cannot be blank when given");
        }
        Ok(())
    }
}

/// Marker that a content fingerprint was already imported into an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupRecord {
    pub account_id: Uuid,
    pub hash: String,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
