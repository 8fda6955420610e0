//! Primitive stream handle

use std::ops::Deref;
use trellis_engine::{procedures, TxHash};
use trellis_value::{Arg, InsertRecordInput};

use crate::stream::Stream;
use crate::{Result, StreamError};
use trellis_common::StreamType;

/// Handle over a primitive stream: the shared surface plus record
/// ingestion. The wrapped handle is checked against the stream's actual
/// type before any primitive-only operation runs.
#[derive(Debug)]
pub struct PrimitiveStream {
    inner: Stream,
}

impl PrimitiveStream {
    pub fn new(stream: Stream) -> Self {
        Self { inner: stream }
    }

    async fn check_type(&self) -> Result<()> {
        match self.inner.stream_type().await? {
            StreamType::Primitive => Ok(()),
            StreamType::Composed => Err(StreamError::NotPrimitive(
                self.inner.locator().stream_id.clone(),
            )),
        }
    }

    /// Append dated records in one transaction. Values travel as decimal
    /// strings; no float conversion happens anywhere on the path.
    pub async fn insert_records(&self, records: &[InsertRecordInput]) -> Result<TxHash> {
        self.check_type().await?;
        let rows = records
            .iter()
            .map(|record| {
                vec![
                    Arg::from(record.date.to_string()),
                    Arg::from(record.value.to_string()),
                ]
            })
            .collect();
        Ok(self
            .inner
            .client()
            .execute(self.inner.dataset_ref(), procedures::INSERT_RECORD, rows)
            .await?)
    }
}

impl Deref for PrimitiveStream {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.inner
    }
}
