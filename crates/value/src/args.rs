//! RPC argument model
//!
//! Procedure arguments are a tagged variant rather than dynamically typed
//! values. A logically absent optional argument is an explicit [`Arg::Null`]
//! in the argument list, distinct from any zero value, so a literal zero
//! (weight 0, day-zero dates) is always representable.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One positional procedure argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
}

impl Arg {
    /// Encode an optional argument, mapping `None` to an explicit null.
    pub fn opt<T: Into<Arg>>(value: Option<T>) -> Arg {
        match value {
            Some(v) => v.into(),
            None => Arg::Null,
        }
    }

    /// JSON form used on the wire. Decimals, dates and timestamps travel
    /// as strings to avoid precision loss.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Arg::Null => JsonValue::Null,
            Arg::Bool(b) => JsonValue::Bool(*b),
            Arg::Int(i) => JsonValue::from(*i),
            Arg::Text(s) => JsonValue::from(s.clone()),
            Arg::Decimal(d) => JsonValue::from(d.to_string()),
            Arg::Date(d) => JsonValue::from(d.to_string()),
            Arg::Timestamp(t) => JsonValue::from(t.to_rfc3339()),
            Arg::TextArray(items) => JsonValue::from(items.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Arg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Arg::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Arg::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text_array(&self) -> Option<&[String]> {
        match self {
            Arg::TextArray(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<Decimal> for Arg {
    fn from(d: Decimal) -> Self {
        Arg::Decimal(d)
    }
}

impl From<NaiveDate> for Arg {
    fn from(d: NaiveDate) -> Self {
        Arg::Date(d)
    }
}

impl From<DateTime<Utc>> for Arg {
    fn from(t: DateTime<Utc>) -> Self {
        Arg::Timestamp(t)
    }
}

impl From<Vec<String>> for Arg {
    fn from(items: Vec<String>) -> Self {
        Arg::TextArray(items)
    }
}
