//! Taxonomy types
//!
//! A taxonomy is the versioned, weighted definition of a composed stream's
//! children. Every `set_taxonomy` call appends a whole new version; the
//! optional start date scopes when a version becomes effective.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trellis_common::StreamLocator;

/// One weighted child of a composed stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyItem {
    pub child_stream: StreamLocator,
    pub weight: Decimal,
}

/// A full taxonomy version: ordered children plus an optional effective
/// start date for the whole set. An unset start date means "active from
/// the beginning of history" (the server stores an epoch sentinel).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    pub items: Vec<TaxonomyItem>,
    pub start_date: Option<NaiveDate>,
}

impl Taxonomy {
    /// True when every weight is non-negative. Negative weights never
    /// reach the wire.
    pub fn weights_valid(&self) -> bool {
        self.items.iter().all(|item| item.weight >= Decimal::ZERO)
    }
}
