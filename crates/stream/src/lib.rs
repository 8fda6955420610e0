//! Stream handles for the Trellis SDK
//!
//! A [`Stream`] is a typed handle over one deployed stream dataset: the
//! metadata surface, access control resolution and record queries shared
//! by both stream types. [`PrimitiveStream`] adds record ingestion,
//! [`ComposedStream`] adds taxonomy management. Handles are cheap to
//! create and cache what they learn about the remote stream (deployment,
//! initialization, stream type) so repeated calls do not re-verify.

use serde::de::DeserializeOwned;
use thiserror::Error;
use trellis_common::{
    AddressError, StreamId, StreamIdError, StreamLocator, StreamTypeError, VisibilityError,
};
use trellis_engine::LedgerError;
use trellis_value::{MetadataKey, ValueError};

pub mod composed;
pub mod deploy;
pub mod primitive;
pub mod stream;

pub use composed::ComposedStream;
pub use deploy::{deploy_stream, destroy_stream};
pub use primitive::PrimitiveStream;
pub use stream::Stream;

/// Decode JSON result rows into typed result structs.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>> {
    Ok(serde_json::from_value(serde_json::Value::Array(rows))?)
}

/// Stream layer errors
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    StreamId(#[from] StreamIdError),

    #[error(transparent)]
    StreamType(#[from] StreamTypeError),

    #[error(transparent)]
    Visibility(#[from] VisibilityError),

    #[error("failed to decode procedure result: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stream {} by {} is not deployed", .0.stream_id, .0.data_provider)]
    StreamNotFound(StreamLocator),

    #[error("stream {0} is already deployed")]
    StreamExists(StreamId),

    #[error("dataset {0} is not a valid stream")]
    NotAStream(String),

    #[error("stream {0} is not initialized")]
    NotInitialized(StreamId),

    #[error("stream {0} is not a primitive stream")]
    NotPrimitive(StreamId),

    #[error("stream {0} is not a composed stream")]
    NotComposed(StreamId),

    #[error("no enabled metadata value for key {key} with reference {reference}")]
    MetadataValueNotFound {
        key: MetadataKey,
        reference: String,
    },

    #[error("no record found")]
    RecordNotFound,

    #[error("invalid taxonomy: {0}")]
    InvalidTaxonomy(String),

    #[error("invalid metadata on stream {stream_id}: {reason}")]
    InvalidMetadata { stream_id: StreamId, reason: String },
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
