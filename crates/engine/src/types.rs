//! Wire types crossing the ledger boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use trellis_common::Address;

/// Handle of a broadcast transaction
///
/// Returned immediately by every mutating operation; the operation is only
/// durable once [`crate::LedgerClient::wait_for_tx`] has confirmed it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmed outcome of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub tx_hash: TxHash,
    pub success: bool,
    /// Application log; carries the failure reason when `success` is false.
    pub log: String,
}

/// Schema of a deployed dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub owner: Address,
    pub procedures: Vec<String>,
}

/// Listing entry for a deployed dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_ref: String,
    pub name: String,
    pub owner: Address,
}
