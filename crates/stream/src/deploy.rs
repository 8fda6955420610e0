//! Stream deployment and destruction

use std::sync::Arc;
use trellis_common::{StreamId, StreamType};
use trellis_engine::{procedures, LedgerClient, LedgerError, TxHash};

use crate::{Result, StreamError};

/// Deploy a stream dataset of the given type, owned by the client's
/// wallet. The stream accepts no data until `init` is confirmed.
pub async fn deploy_stream(
    client: &Arc<dyn LedgerClient>,
    stream_id: &StreamId,
    stream_type: StreamType,
) -> Result<TxHash> {
    let template = match stream_type {
        StreamType::Primitive => procedures::primitive_template(),
        StreamType::Composed => procedures::composed_template(),
    };
    match client.deploy_dataset(stream_id.as_str(), template).await {
        Ok(tx) => Ok(tx),
        Err(LedgerError::DatasetExists(_)) => Err(StreamError::StreamExists(stream_id.clone())),
        Err(err) => Err(err.into()),
    }
}

/// Drop a stream owned by the client's wallet, removing all of its data.
pub async fn destroy_stream(
    client: &Arc<dyn LedgerClient>,
    stream_id: &StreamId,
) -> Result<TxHash> {
    Ok(client.drop_dataset(stream_id.as_str()).await?)
}
