//! Import session state
//!
//! A session walks one uploaded file through Upload, Mapping, Preview and
//! Result. Upload happens in [`ImportService::start_session`]; the other
//! stages are the variants of [`ImportStage`]. Transitions are performed
//! by the service:
//!
//! - `start_session`: Upload to Preview when the account's saved mapping
//!   fits the file, else Upload to Mapping
//! - `confirm_mapping`: Mapping or Preview to Preview
//! - `commit_session`: Preview to Result
//!
//! [`ImportService::start_session`]: super::ImportService::start_session

use serde::Serialize;
use uuid::Uuid;

use super::{FilePreview, ImportPreview, ImportResult};
use crate::domain::{ColumnMapping, ColumnMappingDraft};

/// Where a session currently is
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ImportStage {
    /// The user must choose or fix the mapping
    Mapping {
        /// Best guess from the headers, for the user to edit
        detected: ColumnMappingDraft,
        /// Saved mapping columns absent from this file; empty when there was
        /// no saved mapping
        missing_columns: Vec<String>,
    },
    /// A validated mapping and a dry-run of the import
    Preview {
        mapping: ColumnMapping,
        preview: ImportPreview,
    },
    /// Committed. Terminal.
    Result(ImportResult),
}

impl ImportStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mapping { .. } => "mapping",
            Self::Preview { .. } => "preview",
            Self::Result(_) => "result",
        }
    }
}

/// One file going through the import flow
#[derive(Debug, Clone, Serialize)]
pub struct ImportSession {
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub file: FilePreview,
    pub stage: ImportStage,
    #[serde(skip)]
    pub(super) bytes: Vec<u8>,
}

impl ImportSession {
    pub(super) fn new(
        bytes: Vec<u8>,
        account_id: Option<Uuid>,
        file: FilePreview,
        stage: ImportStage,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            file,
            stage,
            bytes,
        }
    }

    /// The confirmed mapping, once the session has reached Preview
    pub fn mapping(&self) -> Option<&ColumnMapping> {
        match &self.stage {
            ImportStage::Preview { mapping, .. } => Some(mapping),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&ImportPreview> {
        match &self.stage {
            ImportStage::Preview { preview, .. } => Some(preview),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&ImportResult> {
        match &self.stage {
            ImportStage::Result(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.stage, ImportStage::Result(_))
    }
}
