//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
pub mod mapping;
pub mod result;
mod transaction;

pub use account::{DedupRecord, ImportAccount};
pub use mapping::{
    AmountColumns, AmountMode, ColumnMapping, ColumnMappingDraft, DateFormat, DecimalSeparator,
    ThousandSeparator,
};
pub use transaction::{ParseError, ParsedRow, Transaction, TransactionKind, TransactionStatus};
