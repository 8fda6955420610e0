//! The generic stream handle
//!
//! Everything both stream types share: deployment and initialization
//! checks, the metadata surface, access control resolution and the three
//! record queries. The handle verifies lazily that the dataset behind it
//! is a real stream (it must expose the full stream fingerprint) and
//! caches the verdict, along with the stream type, for its lifetime.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use trellis_common::{Address, StreamId, StreamLocator, StreamType, Visibility};
use trellis_engine::{procedures, LedgerClient, TxHash};
use trellis_value::{
    Arg, GetFirstRecordQuery, GetIndexQuery, GetRecordQuery, MetadataKey, MetadataRow,
    MetadataValue, StreamIndex, StreamRecord,
};

use crate::{Result, StreamError};

/// Wire shape of one `get_record`/`get_index` result row.
#[derive(Debug, Deserialize)]
struct RawRecord {
    date_value: NaiveDate,
    value: Decimal,
}

impl From<RawRecord> for StreamRecord {
    fn from(raw: RawRecord) -> Self {
        StreamRecord {
            date: raw.date_value,
            value: raw.value,
        }
    }
}

/// Handle over one deployed stream dataset
pub struct Stream {
    client: Arc<dyn LedgerClient>,
    locator: StreamLocator,
    dataset_ref: String,
    deployed: AtomicBool,
    stream_type: OnceLock<StreamType>,
    owner: OnceLock<Address>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("locator", &self.locator)
            .field("dataset_ref", &self.dataset_ref)
            .finish_non_exhaustive()
    }
}

impl Stream {
    pub fn new(client: Arc<dyn LedgerClient>, locator: StreamLocator) -> Self {
        let dataset_ref = locator.dataset_ref();
        Self {
            client,
            locator,
            dataset_ref,
            deployed: AtomicBool::new(false),
            stream_type: OnceLock::new(),
            owner: OnceLock::new(),
        }
    }

    pub fn locator(&self) -> &StreamLocator {
        &self.locator
    }

    pub fn dataset_ref(&self) -> &str {
        &self.dataset_ref
    }

    pub(crate) fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Verify the dataset exists and carries the stream fingerprint.
    /// Checked once per handle; the verdict cannot change while the
    /// dataset stays deployed.
    pub(crate) async fn ensure_deployed(&self) -> Result<()> {
        if self.deployed.load(Ordering::Relaxed) {
            return Ok(());
        }
        let schema = match self.client.get_schema(&self.dataset_ref).await {
            Ok(schema) => schema,
            Err(trellis_engine::LedgerError::DatasetNotFound(_)) => {
                return Err(StreamError::StreamNotFound(self.locator.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        for required in procedures::STREAM_FINGERPRINT {
            if !schema.procedures.iter().any(|p| p == required) {
                return Err(StreamError::NotAStream(self.dataset_ref.clone()));
            }
        }
        self.deployed.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// The stream's type, read from its `type` metadata row.
    ///
    /// Fails with [`StreamError::NotInitialized`] until `init` has been
    /// confirmed; succeeds from cache afterwards.
    pub async fn stream_type(&self) -> Result<StreamType> {
        if let Some(stream_type) = self.stream_type.get() {
            return Ok(*stream_type);
        }
        self.ensure_deployed().await?;
        let rows = self.get_metadata(MetadataKey::Type, true, None).await?;
        let row = rows
            .first()
            .ok_or_else(|| StreamError::NotInitialized(self.locator.stream_id.clone()))?;
        let stream_type: StreamType = row.value_s.parse()?;
        Ok(*self.stream_type.get_or_init(|| stream_type))
    }

    pub(crate) async fn ensure_initialized(&self) -> Result<()> {
        self.stream_type().await.map(|_| ())
    }

    /// Run the stream's `init` procedure. One-shot: the transaction fails
    /// on an already-initialized stream.
    pub async fn init(&self) -> Result<TxHash> {
        self.ensure_deployed().await?;
        tracing::debug!(stream_id = %self.locator.stream_id, "submitting stream init");
        Ok(self
            .client
            .execute(&self.dataset_ref, procedures::INIT, vec![])
            .await?)
    }

    /// The stream owner recorded at initialization. Cached after the
    /// first successful read; the owner row is permanent.
    pub async fn owner(&self) -> Result<Address> {
        if let Some(owner) = self.owner.get() {
            return Ok(owner.clone());
        }
        self.ensure_initialized().await?;
        let value = self
            .latest_metadata(MetadataKey::StreamOwner)
            .await?
            .ok_or_else(|| StreamError::NotInitialized(self.locator.stream_id.clone()))?;
        match value {
            MetadataValue::Ref(hex) => {
                let owner = Address::new(hex)?;
                Ok(self.owner.get_or_init(|| owner).clone())
            }
            other => Err(StreamError::InvalidMetadata {
                stream_id: self.locator.stream_id.clone(),
                reason: format!("stream_owner holds a {other:?}, expected a ref"),
            }),
        }
    }

    // -- metadata surface --------------------------------------------------

    /// Fetch enabled metadata rows for a key, newest first, optionally
    /// filtered by ref value. Disabled rows never appear.
    pub async fn get_metadata(
        &self,
        key: MetadataKey,
        only_latest: bool,
        reference: Option<&str>,
    ) -> Result<Vec<MetadataRow>> {
        let rows = self
            .client
            .call(
                &self.dataset_ref,
                procedures::GET_METADATA,
                vec![
                    Arg::from(key.as_str()),
                    Arg::from(only_latest),
                    Arg::opt(reference),
                ],
            )
            .await?;
        crate::decode_rows(rows)
    }

    /// The latest enabled value for a key, decoded per the key's declared
    /// kind. `None` when no enabled row exists.
    pub async fn latest_metadata(&self, key: MetadataKey) -> Result<Option<MetadataValue>> {
        let rows = self.get_metadata(key, true, None).await?;
        match rows.first() {
            Some(row) => Ok(Some(row.value_for(key)?)),
            None => Ok(None),
        }
    }

    /// Append one metadata row. The value must match the key's declared
    /// kind; mismatches are rejected before anything reaches the wire.
    pub async fn insert_metadata(
        &self,
        key: MetadataKey,
        value: &MetadataValue,
    ) -> Result<TxHash> {
        let entry = [(key, value.clone())];
        self.batch_insert_metadata(&entry).await
    }

    /// Append several metadata rows in one transaction.
    pub async fn batch_insert_metadata(
        &self,
        entries: &[(MetadataKey, MetadataValue)],
    ) -> Result<TxHash> {
        self.ensure_initialized().await?;
        let mut rows = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let kind = key.value_type();
            let wire = kind.string_from_value(value)?;
            rows.push(vec![
                Arg::from(key.as_str()),
                Arg::from(wire),
                Arg::from(kind.as_str()),
            ]);
        }
        Ok(self
            .client
            .execute(&self.dataset_ref, procedures::INSERT_METADATA, rows)
            .await?)
    }

    /// Disable a metadata row by id. The row stays on the ledger but stops
    /// participating in reads.
    pub async fn disable_metadata(&self, row_id: &str) -> Result<TxHash> {
        self.ensure_initialized().await?;
        Ok(self
            .client
            .execute(
                &self.dataset_ref,
                procedures::DISABLE_METADATA,
                vec![vec![Arg::from(row_id)]],
            )
            .await?)
    }

    /// Disable the latest enabled row holding `reference` for a ref-kind
    /// key. This is how allow-list entries are revoked.
    async fn disable_metadata_by_ref(
        &self,
        key: MetadataKey,
        reference: &str,
    ) -> Result<TxHash> {
        let rows = self.get_metadata(key, false, Some(reference)).await?;
        let row = rows
            .first()
            .ok_or_else(|| StreamError::MetadataValueNotFound {
                key,
                reference: reference.to_string(),
            })?;
        self.disable_metadata(&row.row_id).await
    }

    // -- access control ----------------------------------------------------

    async fn visibility(&self, key: MetadataKey) -> Result<Option<Visibility>> {
        self.ensure_initialized().await?;
        let Some(value) = self.latest_metadata(key).await? else {
            return Ok(None);
        };
        match value {
            MetadataValue::Int(raw) => Ok(Some(Visibility::try_from(raw)?)),
            other => Err(StreamError::InvalidMetadata {
                stream_id: self.locator.stream_id.clone(),
                reason: format!("{key} holds a {other:?}, expected an int"),
            }),
        }
    }

    /// The current read visibility, or `None` if never set.
    pub async fn read_visibility(&self) -> Result<Option<Visibility>> {
        self.visibility(MetadataKey::ReadVisibility).await
    }

    pub async fn set_read_visibility(&self, visibility: Visibility) -> Result<TxHash> {
        self.insert_metadata(
            MetadataKey::ReadVisibility,
            &MetadataValue::Int(visibility.as_i64()),
        )
        .await
    }

    /// The current compose visibility, or `None` if never set.
    pub async fn compose_visibility(&self) -> Result<Option<Visibility>> {
        self.visibility(MetadataKey::ComposeVisibility).await
    }

    pub async fn set_compose_visibility(&self, visibility: Visibility) -> Result<TxHash> {
        self.insert_metadata(
            MetadataKey::ComposeVisibility,
            &MetadataValue::Int(visibility.as_i64()),
        )
        .await
    }

    /// Grant a wallet read access while read visibility is private.
    pub async fn allow_read_wallet(&self, wallet: &Address) -> Result<TxHash> {
        self.insert_metadata(
            MetadataKey::AllowReadWallet,
            &MetadataValue::Ref(wallet.as_str().to_string()),
        )
        .await
    }

    /// Revoke a wallet's read grant. Fails with
    /// [`StreamError::MetadataValueNotFound`] if no enabled grant exists.
    pub async fn disable_read_wallet(&self, wallet: &Address) -> Result<TxHash> {
        self.disable_metadata_by_ref(MetadataKey::AllowReadWallet, wallet.as_str())
            .await
    }

    /// Wallets currently holding a read grant.
    pub async fn allowed_read_wallets(&self) -> Result<Vec<Address>> {
        self.ensure_initialized().await?;
        let rows = self
            .get_metadata(MetadataKey::AllowReadWallet, false, None)
            .await?;
        rows.iter()
            .map(|row| Address::new(&row.value_ref).map_err(StreamError::from))
            .collect()
    }

    /// Grant a composing stream access while compose visibility is private.
    pub async fn allow_compose_stream(&self, composer: &StreamLocator) -> Result<TxHash> {
        self.insert_metadata(
            MetadataKey::AllowComposeStream,
            &MetadataValue::Ref(composer.dataset_ref()),
        )
        .await
    }

    /// Revoke a composing stream's grant.
    pub async fn disable_compose_stream(&self, composer: &StreamLocator) -> Result<TxHash> {
        self.disable_metadata_by_ref(MetadataKey::AllowComposeStream, &composer.dataset_ref())
            .await
    }

    /// Streams currently allowed to compose this one, resolved back to
    /// locators through each granted dataset's schema. A grant whose
    /// dataset no longer carries a stream id name is an error, not
    /// silently returned.
    pub async fn allowed_compose_streams(&self) -> Result<Vec<StreamLocator>> {
        self.ensure_initialized().await?;
        let rows = self
            .get_metadata(MetadataKey::AllowComposeStream, false, None)
            .await?;
        let mut locators = Vec::with_capacity(rows.len());
        for row in rows {
            let schema = self.client.get_schema(&row.value_ref).await?;
            let stream_id =
                StreamId::new(&schema.name).map_err(|_| StreamError::InvalidMetadata {
                    stream_id: self.locator.stream_id.clone(),
                    reason: format!(
                        "allow_compose_stream grant {} does not name a stream",
                        row.value_ref
                    ),
                })?;
            locators.push(StreamLocator::new(stream_id, schema.owner));
        }
        Ok(locators)
    }

    /// The stream's default index base date, or `None` if never set.
    pub async fn default_base_date(&self) -> Result<Option<NaiveDate>> {
        self.ensure_initialized().await?;
        let Some(value) = self.latest_metadata(MetadataKey::DefaultBaseDate).await? else {
            return Ok(None);
        };
        let Some(raw) = value.as_str() else {
            return Err(StreamError::InvalidMetadata {
                stream_id: self.locator.stream_id.clone(),
                reason: "default_base_date holds a non-string value".to_string(),
            });
        };
        raw.parse()
            .map(Some)
            .map_err(|_| StreamError::InvalidMetadata {
                stream_id: self.locator.stream_id.clone(),
                reason: format!("default_base_date is not a date: {raw}"),
            })
    }

    /// Set the date whose aggregate defines index 100 when callers do not
    /// pass one explicitly.
    pub async fn set_default_base_date(&self, date: NaiveDate) -> Result<TxHash> {
        self.insert_metadata(
            MetadataKey::DefaultBaseDate,
            &MetadataValue::String(date.to_string()),
        )
        .await
    }

    // -- record queries ----------------------------------------------------

    async fn record_call(&self, procedure: &str, args: Vec<Arg>) -> Result<Vec<StreamRecord>> {
        self.ensure_initialized().await?;
        let rows = self.client.call(&self.dataset_ref, procedure, args).await?;
        let raw: Vec<RawRecord> = crate::decode_rows(rows)?;
        Ok(raw.into_iter().map(StreamRecord::from).collect())
    }

    /// Raw record values in the query range, date ascending.
    pub async fn get_record(&self, query: &GetRecordQuery) -> Result<Vec<StreamRecord>> {
        self.record_call(
            procedures::GET_RECORD,
            vec![
                Arg::opt(query.date_from),
                Arg::opt(query.date_to),
                Arg::opt(query.frozen_at),
            ],
        )
        .await
    }

    /// Index values (percentage of the base-date aggregate) in the query
    /// range, date ascending.
    pub async fn get_index(&self, query: &GetIndexQuery) -> Result<Vec<StreamIndex>> {
        self.record_call(
            procedures::GET_INDEX,
            vec![
                Arg::opt(query.date_from),
                Arg::opt(query.date_to),
                Arg::opt(query.frozen_at),
                Arg::opt(query.base_date),
            ],
        )
        .await
    }

    /// The earliest record at or after the query's date, or
    /// [`StreamError::RecordNotFound`] if the stream has none.
    pub async fn get_first_record(&self, query: &GetFirstRecordQuery) -> Result<StreamRecord> {
        let mut rows = self
            .record_call(
                procedures::GET_FIRST_RECORD,
                vec![Arg::opt(query.after_date), Arg::opt(query.frozen_at)],
            )
            .await?;
        if rows.is_empty() {
            return Err(StreamError::RecordNotFound);
        }
        Ok(rows.swap_remove(0))
    }
}
