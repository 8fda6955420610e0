//! Typed values for the Trellis SDK
//!
//! The metadata codec (keys, declared kinds, wire encoding), the RPC
//! argument model, and the record/taxonomy types shared by stream handles
//! and the ledger boundary.

pub mod args;
pub mod metadata;
pub mod records;
pub mod taxonomy;

pub use args::Arg;
pub use metadata::{MetadataKey, MetadataRow, MetadataType, MetadataValue, ValueError};
pub use records::{
    GetFirstRecordQuery, GetIndexQuery, GetRecordQuery, InsertRecordInput, StreamIndex,
    StreamRecord,
};
pub use taxonomy::{Taxonomy, TaxonomyItem};
