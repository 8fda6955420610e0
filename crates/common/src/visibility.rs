//! Read and compose visibility flags
//!
//! Visibility is persisted as an int-kind metadata value: 0 for public,
//! 1 for private. Absence of any enabled visibility row means "no explicit
//! setting" and is surfaced as `None` by the stream API, never defaulted
//! here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Visibility decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisibilityError {
    #[error("invalid visibility value: {0}")]
    InvalidValue(i64),
}

/// Per-stream visibility setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public = 0,
    Private = 1,
}

impl Visibility {
    /// Wire representation of the flag.
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for Visibility {
    type Error = VisibilityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Visibility::Public),
            1 => Ok(Visibility::Private),
            other => Err(VisibilityError::InvalidValue(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        assert_eq!(Visibility::try_from(0).unwrap(), Visibility::Public);
        assert_eq!(Visibility::try_from(1).unwrap(), Visibility::Private);
        assert_eq!(Visibility::Public.as_i64(), 0);
        assert_eq!(Visibility::Private.as_i64(), 1);
    }

    #[test]
    fn rejects_unknown_discriminants() {
        assert!(Visibility::try_from(2).is_err());
        assert!(Visibility::try_from(-1).is_err());
    }
}
