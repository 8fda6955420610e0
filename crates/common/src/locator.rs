//! Stream locators and dataset references
//!
//! A locator is the (stream id, data provider) pair that uniquely
//! addresses one deployed stream. The ledger itself addresses datasets by
//! a deterministic reference derived from both fields.

use crate::{Address, StreamId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Stream type decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamTypeError {
    #[error("unknown stream type: {0}")]
    Unknown(String),
}

/// Whether a stream holds raw records or composes child streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Primitive,
    Composed,
}

impl StreamType {
    /// Wire string stored in the `type` metadata row.
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Primitive => "primitive",
            StreamType::Composed => "composed",
        }
    }
}

impl std::str::FromStr for StreamType {
    type Err = StreamTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primitive" => Ok(StreamType::Primitive),
            "composed" => Ok(StreamType::Composed),
            other => Err(StreamTypeError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique address of one deployed stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamLocator {
    pub stream_id: StreamId,
    pub data_provider: Address,
}

impl StreamLocator {
    pub fn new(stream_id: StreamId, data_provider: Address) -> Self {
        Self {
            stream_id,
            data_provider,
        }
    }

    /// The ledger dataset reference for this locator.
    pub fn dataset_ref(&self) -> String {
        dataset_ref(self.stream_id.as_str(), &self.data_provider)
    }
}

/// Derive the deterministic dataset reference for a (name, owner) pair.
///
/// Pure function of its inputs: the reference is `ds` plus the first 40 hex
/// characters of SHA-256 over the owner bytes followed by the dataset name.
/// Distinct pairs never collide by construction of the hash. The name is a
/// stream id string for streams, but any deployed dataset is addressable.
pub fn dataset_ref(name: &str, owner: &Address) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.to_bytes());
    hasher.update(name.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("ds{}", &digest[..40])
}
