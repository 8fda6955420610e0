//! Shared identifier and address types for the Trellis SDK
//!
//! Everything that addresses a stream lives here: validated stream ids,
//! account addresses, visibility flags and the deterministic dataset
//! reference derivation used to locate deployed streams on the ledger.

pub mod address;
pub mod locator;
pub mod stream_id;
pub mod visibility;

pub use address::{Address, AddressError};
pub use locator::{dataset_ref, StreamLocator, StreamType, StreamTypeError};
pub use stream_id::{StreamId, StreamIdError};
pub use visibility::{Visibility, VisibilityError};
