//! Stream record types and query inputs
//!
//! Record values are decimals; they cross the wire as strings and are
//! parsed exactly, never through a binary float.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One dated value of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Index values share the record shape; the value is a percentage of the
/// base-date aggregate.
pub type StreamIndex = StreamRecord;

/// Inputs for `get_record`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetRecordQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Exclude records inserted after this instant.
    pub frozen_at: Option<DateTime<Utc>>,
}

/// Inputs for `get_index`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetIndexQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub frozen_at: Option<DateTime<Utc>>,
    /// Date whose aggregate defines index 100. Falls back to the stream's
    /// `default_base_date` metadata, then to the first record's date.
    pub base_date: Option<NaiveDate>,
}

/// Inputs for `get_first_record`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetFirstRecordQuery {
    pub after_date: Option<NaiveDate>,
    pub frozen_at: Option<DateTime<Utc>>,
}

/// One record to append to a primitive stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRecordInput {
    pub date: NaiveDate,
    pub value: Decimal,
}
