//! Account addresses
//!
//! An address is a 20-byte account identifier, canonically stored as a
//! lowercase `0x`-prefixed 40-hex-digit string. Input is accepted with or
//! without the prefix and in any case; it is normalized once at
//! construction and never touched again. There is no way to obtain an
//! unvalidated `Address`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Address validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address cannot be empty")]
    Empty,

    #[error("address '{0}' does not match ^0x[a-f0-9]{{40}}$")]
    InvalidFormat(String),
}

/// A validated 20-byte account address
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string.
    ///
    /// The canonical internal representation is lowercase with the `0x`
    /// prefix; both prefixed and bare inputs are accepted.
    pub fn new(s: impl AsRef<str>) -> Result<Self, AddressError> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let lower = s.to_ascii_lowercase();
        let canonical = if let Some(stripped) = lower.strip_prefix("0x") {
            format!("0x{stripped}")
        } else {
            format!("0x{lower}")
        };

        let hex_part = &canonical[2..];
        if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidFormat(canonical));
        }

        Ok(Self(canonical))
    }

    /// Construct from raw address bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        Self::new(hex::encode(bytes))
    }

    /// The canonical `0x`-prefixed lowercase representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digits without the `0x` prefix.
    pub fn bare_hex(&self) -> &str {
        &self.0[2..]
    }

    /// The raw 20 address bytes.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // the canonical form is validated 40-digit hex, decoding cannot fail
        let _ = hex::decode_to_slice(self.bare_hex(), &mut out);
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    #[test]
    fn accepts_with_and_without_prefix() {
        let a = Address::new(format!("0x{RAW}")).unwrap();
        let b = Address::new(RAW).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), format!("0x{RAW}"));
    }

    #[test]
    fn normalizes_case() {
        let upper = RAW.to_ascii_uppercase();
        let a = Address::new(format!("0x{upper}")).unwrap();
        assert_eq!(a.as_str(), format!("0x{RAW}"));
    }

    #[test]
    fn round_trips_through_string() {
        let a = Address::new(RAW).unwrap();
        let b = Address::new(a.as_str()).unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn round_trips_through_bytes() {
        let a = Address::new(RAW).unwrap();
        let bytes = a.to_bytes();
        assert_eq!(bytes[0], 0x7e);
        assert_eq!(bytes[19], 0xdf);
        let b = Address::from_bytes(&bytes).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(Address::new(""), Err(AddressError::Empty)));
        assert!(Address::new("0x1234").is_err());
        assert!(Address::new("0xzz5f4552091a69125d5dfcb7b8c2659029395bdf").is_err());
        // 41 hex digits
        assert!(Address::new(format!("0x{RAW}0")).is_err());
    }
}
