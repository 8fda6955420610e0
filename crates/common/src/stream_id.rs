//! Stream identifiers
//!
//! A stream id is a fixed-format token: the literal prefix `st` followed by
//! 30 hex characters, 32 characters total. Ids are either supplied directly
//! (and validated) or derived deterministically from a human-readable name
//! by hashing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Total length of a stream id, prefix included.
pub const STREAM_ID_LEN: usize = 32;

/// Required prefix of every stream id.
pub const STREAM_ID_PREFIX: &str = "st";

/// Stream id validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamIdError {
    #[error("invalid stream id '{0}': expected {STREAM_ID_LEN} chars with '{STREAM_ID_PREFIX}' prefix")]
    InvalidFormat(String),
}

/// A validated stream identifier
///
/// Construction goes through [`StreamId::new`] or [`StreamId::generate`];
/// a value that exists is always well-formed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamId(String);

impl StreamId {
    /// Validate and wrap a raw stream id string.
    pub fn new(s: impl Into<String>) -> Result<Self, StreamIdError> {
        let s = s.into();
        if s.len() != STREAM_ID_LEN || !s.starts_with(STREAM_ID_PREFIX) {
            return Err(StreamIdError::InvalidFormat(s));
        }
        Ok(Self(s))
    }

    /// Derive a stream id from an arbitrary name.
    ///
    /// Same name, same id: the id is the `st` prefix plus the first 30 hex
    /// characters of the SHA-256 digest of the name. Infallible for any
    /// input string.
    pub fn generate(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let hex_digest = hex::encode(digest);
        Self(format!("{STREAM_ID_PREFIX}{}", &hex_digest[..STREAM_ID_LEN - 2]))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId({})", self.0)
    }
}

impl TryFrom<String> for StreamId {
    type Error = StreamIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StreamId> for String {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_is_deterministic() {
        let a = StreamId::generate("my-stream");
        let b = StreamId::generate("my-stream");
        assert_eq!(a, b);

        let c = StreamId::generate("my-other-stream");
        assert_ne!(a, c);
    }

    #[test]
    fn generated_ids_satisfy_invariant() {
        for name in ["", "a", "some longer human name", "ünïcødé"] {
            let id = StreamId::generate(name);
            assert_eq!(id.as_str().len(), STREAM_ID_LEN);
            assert!(id.as_str().starts_with(STREAM_ID_PREFIX));
            // re-validating the generated id must succeed
            StreamId::new(id.as_str()).unwrap();
        }
    }

    #[test]
    fn rejects_bad_length_and_prefix() {
        assert!(StreamId::new("st123").is_err());
        assert!(StreamId::new("xx906974fb3f30a28200e907c604b15b").is_err());
        assert!(StreamId::new("").is_err());
        // valid shape
        assert!(StreamId::new("st906974fb3f30a28200e907c604b15b").is_ok());
    }

    #[test]
    fn serde_round_trip() {
        let id = StreamId::generate("serde");
        let json = serde_json::to_string(&id).unwrap();
        let back: StreamId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        // malformed ids are rejected at decode time
        assert!(serde_json::from_str::<StreamId>("\"not-a-stream-id\"").is_err());
    }
}
