//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the account registry and transaction store
//! - An in-memory store with the same contract

pub mod duckdb;
pub mod memory;
