//! Ledger boundary for the Trellis SDK
//!
//! This crate defines the [`LedgerClient`] trait — the SDK's only view of
//! the remote ledger-backed database platform — together with the wire
//! types that cross it, and an in-memory [`MockLedger`] that reproduces the
//! server-side procedure contracts so the resolution and aggregation
//! algorithms are testable without a network.

use thiserror::Error;

pub mod client;
pub mod ledger;
pub mod procedures;
pub mod types;

pub use client::{LedgerClient, MockLedgerClient};
pub use ledger::MockLedger;
pub use types::{DatasetInfo, Schema, TxHash, TxResult};

/// Ledger boundary errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("dataset exists: {0}")]
    DatasetExists(String),

    #[error("procedure {procedure} not found on dataset {dataset}")]
    ProcedureNotFound { dataset: String, procedure: String },

    #[error("wallet {caller} is not allowed to read dataset {dataset}")]
    NotAuthorized { dataset: String, caller: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("circular taxonomy through dataset {0}")]
    CircularTaxonomy(String),

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
