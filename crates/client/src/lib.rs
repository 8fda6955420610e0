//! High-level client for the Trellis stream platform
//!
//! [`Client`] wraps a ledger connection with stream lifecycle management:
//! deploying and destroying streams, loading typed handles, discovering
//! deployed streams and the confirm-before-next-step composite deploy
//! workflow.

use thiserror::Error;
use trellis_common::StreamLocator;
use trellis_engine::{LedgerError, TxHash};
use trellis_stream::StreamError;

pub mod client;

pub use client::Client;

/// Client layer errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("transaction {tx_hash} failed: {log}")]
    TxFailed { tx_hash: TxHash, log: String },

    #[error("taxonomy child {0:?} is not deployed")]
    ChildNotFound(StreamLocator),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
