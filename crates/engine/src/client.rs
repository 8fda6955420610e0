//! Ledger client trait and the mock implementation
//!
//! [`LedgerClient`] is the SDK's entire view of the remote platform.
//! Transport, signing and broadcast live behind it; everything above deals
//! in typed arguments and JSON rows. [`MockLedgerClient`] binds a caller
//! identity to a shared [`MockLedger`], matching how the production client
//! binds a signer to a node.

use crate::{ledger::MockLedger, DatasetInfo, Result, Schema, TxHash, TxResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use trellis_common::Address;
use trellis_value::Arg;

/// Client interface to the ledger-backed database platform
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// The wallet this client signs with.
    fn caller(&self) -> &Address;

    /// Invoke a read-only procedure; rows come back as JSON objects keyed
    /// by column name.
    async fn call(
        &self,
        dataset_ref: &str,
        procedure: &str,
        args: Vec<Arg>,
    ) -> Result<Vec<JsonValue>>;

    /// Invoke a state-changing procedure with one argument row per tuple.
    /// Returns immediately; durability requires [`Self::wait_for_tx`].
    async fn execute(
        &self,
        dataset_ref: &str,
        procedure: &str,
        rows: Vec<Vec<Arg>>,
    ) -> Result<TxHash>;

    /// Fetch the schema of a deployed dataset.
    async fn get_schema(&self, dataset_ref: &str) -> Result<Schema>;

    /// Deploy a new dataset owned by the caller.
    async fn deploy_dataset(&self, name: &str, procedures: Vec<String>) -> Result<TxHash>;

    /// Drop a dataset owned by the caller.
    async fn drop_dataset(&self, name: &str) -> Result<TxHash>;

    /// List deployed datasets, optionally filtered by owner.
    async fn list_datasets(&self, owner: Option<&Address>) -> Result<Vec<DatasetInfo>>;

    /// Poll for a transaction result at the given interval. There is no
    /// built-in timeout; callers impose their own deadline by dropping the
    /// future.
    async fn wait_for_tx(&self, tx_hash: &TxHash, interval: Duration) -> Result<TxResult>;
}

/// Mock client bound to one caller wallet
#[derive(Clone)]
pub struct MockLedgerClient {
    caller: Address,
    ledger: Arc<MockLedger>,
}

impl MockLedgerClient {
    /// Create a client for `caller` against a shared mock ledger.
    pub fn new(caller: Address, ledger: Arc<MockLedger>) -> Self {
        Self { caller, ledger }
    }

    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    fn caller(&self) -> &Address {
        &self.caller
    }

    async fn call(
        &self,
        dataset_ref: &str,
        procedure: &str,
        args: Vec<Arg>,
    ) -> Result<Vec<JsonValue>> {
        self.ledger.call(&self.caller, dataset_ref, procedure, args)
    }

    async fn execute(
        &self,
        dataset_ref: &str,
        procedure: &str,
        rows: Vec<Vec<Arg>>,
    ) -> Result<TxHash> {
        self.ledger
            .execute(&self.caller, dataset_ref, procedure, rows)
    }

    async fn get_schema(&self, dataset_ref: &str) -> Result<Schema> {
        self.ledger.get_schema(dataset_ref)
    }

    async fn deploy_dataset(&self, name: &str, procedures: Vec<String>) -> Result<TxHash> {
        self.ledger.deploy_dataset(&self.caller, name, procedures)
    }

    async fn drop_dataset(&self, name: &str) -> Result<TxHash> {
        self.ledger.drop_dataset(&self.caller, name)
    }

    async fn list_datasets(&self, owner: Option<&Address>) -> Result<Vec<DatasetInfo>> {
        Ok(self.ledger.list_datasets(owner))
    }

    async fn wait_for_tx(&self, tx_hash: &TxHash, interval: Duration) -> Result<TxResult> {
        loop {
            if let Some(result) = self.ledger.tx_result(tx_hash) {
                return Ok(result);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
