//! Metadata keys, declared kinds and the wire codec
//!
//! Every metadata key declares exactly one physical kind. The kind decides
//! which column of a metadata row is authoritative and how a value
//! serializes to the string form the remote procedures expect. Rows are
//! append-only on the ledger; this module only encodes and decodes them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Metadata codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("type mismatch for key kind {expected}: got {got}")]
    TypeMismatch {
        expected: MetadataType,
        got: &'static str,
    },

    #[error("unsupported metadata type: {0}")]
    UnsupportedType(String),
}

/// The fixed set of metadata keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    Type,
    StreamOwner,
    ReadonlyKey,
    ComposeVisibility,
    ReadVisibility,
    AllowReadWallet,
    AllowComposeStream,
    DefaultBaseDate,
}

impl MetadataKey {
    /// Wire name of the key.
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::Type => "type",
            MetadataKey::StreamOwner => "stream_owner",
            MetadataKey::ReadonlyKey => "readonly_key",
            MetadataKey::ComposeVisibility => "compose_visibility",
            MetadataKey::ReadVisibility => "read_visibility",
            MetadataKey::AllowReadWallet => "allow_read_wallet",
            MetadataKey::AllowComposeStream => "allow_compose_stream",
            MetadataKey::DefaultBaseDate => "default_base_date",
        }
    }

    /// The declared value kind of this key.
    pub fn value_type(self) -> MetadataType {
        match self {
            MetadataKey::Type => MetadataType::String,
            MetadataKey::StreamOwner => MetadataType::Ref,
            MetadataKey::ReadonlyKey => MetadataType::String,
            MetadataKey::ComposeVisibility => MetadataType::Int,
            MetadataKey::ReadVisibility => MetadataType::Int,
            MetadataKey::AllowReadWallet => MetadataType::Ref,
            MetadataKey::AllowComposeStream => MetadataType::Ref,
            MetadataKey::DefaultBaseDate => MetadataType::String,
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical kind of a metadata value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    Int,
    Bool,
    String,
    Ref,
}

impl MetadataType {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataType::Int => "int",
            MetadataType::Bool => "bool",
            MetadataType::String => "string",
            MetadataType::Ref => "ref",
        }
    }

    /// Serialize a value of this kind to its wire string.
    ///
    /// Fails when the value's runtime kind does not match the declared
    /// kind; this is the boundary where type confusion is caught.
    pub fn string_from_value(self, value: &MetadataValue) -> Result<String, ValueError> {
        match (self, value) {
            (MetadataType::Int, MetadataValue::Int(i)) => Ok(i.to_string()),
            (MetadataType::Bool, MetadataValue::Bool(b)) => Ok(b.to_string()),
            (MetadataType::String, MetadataValue::String(s)) => Ok(s.clone()),
            (MetadataType::Ref, MetadataValue::Ref(r)) => Ok(r.clone()),
            (expected, got) => Err(ValueError::TypeMismatch {
                expected,
                got: got.kind_name(),
            }),
        }
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetadataType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(MetadataType::Int),
            "bool" => Ok(MetadataType::Bool),
            "string" => Ok(MetadataType::String),
            "ref" => Ok(MetadataType::Ref),
            other => Err(ValueError::UnsupportedType(other.to_string())),
        }
    }
}

/// A typed metadata value, one constructor per physical kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataValue {
    Int(i64),
    Bool(bool),
    String(String),
    Ref(String),
}

impl MetadataValue {
    fn kind_name(&self) -> &'static str {
        match self {
            MetadataValue::Int(_) => "int",
            MetadataValue::Bool(_) => "bool",
            MetadataValue::String(_) => "string",
            MetadataValue::Ref(_) => "ref",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) | MetadataValue::Ref(s) => Some(s),
            _ => None,
        }
    }
}

/// One decoded metadata row
///
/// Only the column selected by the key's declared kind is meaningful;
/// [`MetadataRow::value_for`] performs the selection. `created_at` is the
/// ledger height at which the row was appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub row_id: String,
    #[serde(default)]
    pub value_i: i64,
    #[serde(default)]
    pub value_b: bool,
    #[serde(default)]
    pub value_s: String,
    #[serde(default)]
    pub value_ref: String,
    pub created_at: u64,
}

impl MetadataRow {
    /// Reconstruct the typed value this row holds for the given key.
    pub fn value_for(&self, key: MetadataKey) -> Result<MetadataValue, ValueError> {
        Ok(match key.value_type() {
            MetadataType::Int => MetadataValue::Int(self.value_i),
            MetadataType::Bool => MetadataValue::Bool(self.value_b),
            MetadataType::String => MetadataValue::String(self.value_s.clone()),
            MetadataType::Ref => MetadataValue::Ref(self.value_ref.clone()),
        })
    }
}
