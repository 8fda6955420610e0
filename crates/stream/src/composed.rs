//! Composed stream handle

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::Deref;
use trellis_common::{Address, StreamId, StreamLocator, StreamType};
use trellis_engine::{procedures, TxHash};
use trellis_value::{Arg, Taxonomy, TaxonomyItem};

use crate::stream::Stream;
use crate::{Result, StreamError};

/// Wire shape of one `describe_taxonomies` result row.
#[derive(Debug, Deserialize)]
struct RawTaxonomyRow {
    child_stream_id: String,
    child_data_provider: String,
    weight: Decimal,
    version: u64,
    /// Empty string when the version has no explicit start date.
    start_date: String,
}

/// Handle over a composed stream: the shared surface plus taxonomy
/// management. Type-checked against the remote stream before any
/// composed-only operation runs.
#[derive(Debug)]
pub struct ComposedStream {
    inner: Stream,
}

impl ComposedStream {
    pub fn new(stream: Stream) -> Self {
        Self { inner: stream }
    }

    async fn check_type(&self) -> Result<()> {
        match self.inner.stream_type().await? {
            StreamType::Composed => Ok(()),
            StreamType::Primitive => Err(StreamError::NotComposed(
                self.inner.locator().stream_id.clone(),
            )),
        }
    }

    /// Append a new taxonomy version. Earlier versions stay on the ledger;
    /// the version active at a query date is picked by start date.
    pub async fn set_taxonomy(&self, taxonomy: &Taxonomy) -> Result<TxHash> {
        self.check_type().await?;
        if taxonomy.items.is_empty() {
            return Err(StreamError::InvalidTaxonomy(
                "taxonomy has no children".to_string(),
            ));
        }
        if !taxonomy.weights_valid() {
            return Err(StreamError::InvalidTaxonomy(
                "taxonomy weights must be non-negative".to_string(),
            ));
        }

        let mut providers = Vec::with_capacity(taxonomy.items.len());
        let mut stream_ids = Vec::with_capacity(taxonomy.items.len());
        let mut weights = Vec::with_capacity(taxonomy.items.len());
        for item in &taxonomy.items {
            providers.push(item.child_stream.data_provider.as_str().to_string());
            stream_ids.push(item.child_stream.stream_id.as_str().to_string());
            weights.push(item.weight.to_string());
        }

        tracing::debug!(
            stream_id = %self.inner.locator().stream_id,
            children = taxonomy.items.len(),
            "submitting taxonomy version"
        );
        Ok(self
            .inner
            .client()
            .execute(
                self.inner.dataset_ref(),
                procedures::SET_TAXONOMY,
                vec![vec![
                    Arg::TextArray(providers),
                    Arg::TextArray(stream_ids),
                    Arg::TextArray(weights),
                    Arg::opt(taxonomy.start_date),
                ]],
            )
            .await?)
    }

    /// Fetch taxonomy versions, oldest first, or only the latest one.
    pub async fn describe_taxonomies(&self, latest_only: bool) -> Result<Vec<Taxonomy>> {
        self.check_type().await?;
        let rows = self
            .inner
            .client()
            .call(
                self.inner.dataset_ref(),
                procedures::DESCRIBE_TAXONOMIES,
                vec![Arg::from(latest_only)],
            )
            .await?;
        let raw: Vec<RawTaxonomyRow> = crate::decode_rows(rows)?;

        let mut versions: BTreeMap<u64, Taxonomy> = BTreeMap::new();
        for row in raw {
            let start_date = if row.start_date.is_empty() {
                None
            } else {
                let date: NaiveDate = row.start_date.parse().map_err(|_| {
                    StreamError::InvalidTaxonomy(format!(
                        "unparseable start date: {}",
                        row.start_date
                    ))
                })?;
                Some(date)
            };
            let item = TaxonomyItem {
                child_stream: StreamLocator::new(
                    StreamId::new(row.child_stream_id)?,
                    Address::new(row.child_data_provider)?,
                ),
                weight: row.weight,
            };
            let taxonomy = versions.entry(row.version).or_insert_with(|| Taxonomy {
                items: Vec::new(),
                start_date,
            });
            taxonomy.items.push(item);
        }
        Ok(versions.into_values().collect())
    }
}

impl Deref for ComposedStream {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.inner
    }
}
