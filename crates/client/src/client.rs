//! The client facade

use std::sync::Arc;
use std::time::Duration;
use trellis_common::{Address, StreamId, StreamLocator, StreamType};
use trellis_engine::{procedures, LedgerClient, LedgerError, TxHash, TxResult};
use trellis_stream::{ComposedStream, PrimitiveStream, Stream, StreamError};
use trellis_value::Taxonomy;

use crate::{ClientError, Result};

const DEFAULT_TX_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Entry point for everything the SDK does against one wallet
pub struct Client {
    ledger: Arc<dyn LedgerClient>,
    tx_poll_interval: Duration,
}

impl Client {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            tx_poll_interval: DEFAULT_TX_POLL_INTERVAL,
        }
    }

    /// Override how often [`Client::wait_for_tx`] polls for a receipt.
    pub fn with_tx_poll_interval(mut self, interval: Duration) -> Self {
        self.tx_poll_interval = interval;
        self
    }

    /// The wallet this client signs with.
    pub fn address(&self) -> &Address {
        self.ledger.caller()
    }

    /// Locator for a stream owned by this client's wallet.
    pub fn own_stream_locator(&self, stream_id: StreamId) -> StreamLocator {
        StreamLocator::new(stream_id, self.address().clone())
    }

    /// Block until the transaction is confirmed; a failed receipt becomes
    /// an error carrying the application log.
    pub async fn wait_for_tx(&self, tx_hash: &TxHash) -> Result<TxResult> {
        let result = self
            .ledger
            .wait_for_tx(tx_hash, self.tx_poll_interval)
            .await?;
        if result.success {
            Ok(result)
        } else {
            Err(ClientError::TxFailed {
                tx_hash: result.tx_hash,
                log: result.log,
            })
        }
    }

    /// Deploy a stream dataset of the given type, owned by this wallet.
    /// The stream still needs `init` before it accepts data.
    pub async fn deploy_stream(
        &self,
        stream_id: &StreamId,
        stream_type: StreamType,
    ) -> Result<TxHash> {
        Ok(trellis_stream::deploy_stream(&self.ledger, stream_id, stream_type).await?)
    }

    /// Drop a stream owned by this wallet, removing all of its data.
    pub async fn destroy_stream(&self, stream_id: &StreamId) -> Result<TxHash> {
        Ok(trellis_stream::destroy_stream(&self.ledger, stream_id).await?)
    }

    /// A generic handle on any deployed stream.
    pub fn load_stream(&self, locator: StreamLocator) -> Stream {
        Stream::new(self.ledger.clone(), locator)
    }

    /// A primitive handle; type-checked on first primitive-only call.
    pub fn load_primitive_stream(&self, locator: StreamLocator) -> PrimitiveStream {
        PrimitiveStream::new(self.load_stream(locator))
    }

    /// A composed handle; type-checked on first composed-only call.
    pub fn load_composed_stream(&self, locator: StreamLocator) -> ComposedStream {
        ComposedStream::new(self.load_stream(locator))
    }

    /// Locators of every deployed stream, optionally restricted to one
    /// owner. Datasets whose name is not a stream id, or that lack the
    /// stream procedure fingerprint, are skipped.
    pub async fn get_all_streams(&self, owner: Option<&Address>) -> Result<Vec<StreamLocator>> {
        let datasets = self.ledger.list_datasets(owner).await?;
        let mut locators = Vec::new();
        for info in datasets {
            let stream_id = match StreamId::new(info.name.as_str()) {
                Ok(id) => id,
                Err(_) => {
                    tracing::debug!(name = %info.name, "skipping dataset, name is not a stream id");
                    continue;
                }
            };
            let schema = self.ledger.get_schema(&info.dataset_ref).await?;
            let is_stream = procedures::STREAM_FINGERPRINT
                .iter()
                .all(|required| schema.procedures.iter().any(|p| p == required));
            if !is_stream {
                tracing::debug!(name = %info.name, "skipping dataset, missing stream procedures");
                continue;
            }
            locators.push(StreamLocator::new(stream_id, info.owner));
        }
        Ok(locators)
    }

    /// Like [`Client::get_all_streams`], restricted to streams whose
    /// `init` has been confirmed. Uninitialized streams are skipped with a
    /// warning rather than failing the whole scan.
    pub async fn get_all_initialized_streams(
        &self,
        owner: Option<&Address>,
    ) -> Result<Vec<StreamLocator>> {
        let mut initialized = Vec::new();
        for locator in self.get_all_streams(owner).await? {
            let stream = self.load_stream(locator.clone());
            match stream.stream_type().await {
                Ok(_) => initialized.push(locator),
                Err(StreamError::NotInitialized(stream_id)) => {
                    tracing::warn!(%stream_id, "skipping uninitialized stream");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(initialized)
    }

    /// Deploy, initialize and configure a composed stream in one workflow,
    /// confirming each transaction before issuing the next.
    ///
    /// Refuses to touch an already-deployed stream and verifies every
    /// taxonomy child is deployed before anything is broadcast.
    pub async fn deploy_composed_stream_with_taxonomy(
        &self,
        stream_id: &StreamId,
        taxonomy: &Taxonomy,
    ) -> Result<ComposedStream> {
        let locator = self.own_stream_locator(stream_id.clone());
        match self.ledger.get_schema(&locator.dataset_ref()).await {
            Ok(_) => return Err(StreamError::StreamExists(stream_id.clone()).into()),
            Err(LedgerError::DatasetNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        for item in &taxonomy.items {
            match self.ledger.get_schema(&item.child_stream.dataset_ref()).await {
                Ok(_) => {}
                Err(LedgerError::DatasetNotFound(_)) => {
                    return Err(ClientError::ChildNotFound(item.child_stream.clone()))
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(%stream_id, "deploying composed stream");
        let tx = self.deploy_stream(stream_id, StreamType::Composed).await?;
        self.wait_for_tx(&tx).await?;

        let composed = self.load_composed_stream(locator);
        tracing::info!(%stream_id, "initializing composed stream");
        let tx = composed.init().await?;
        self.wait_for_tx(&tx).await?;

        tracing::info!(%stream_id, children = taxonomy.items.len(), "setting taxonomy");
        let tx = composed.set_taxonomy(taxonomy).await?;
        self.wait_for_tx(&tx).await?;

        Ok(composed)
    }
}
