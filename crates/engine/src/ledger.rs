//! In-memory mock ledger
//!
//! Reproduces the server-side procedure contracts the SDK is written
//! against: the append-only metadata store with soft disables, visibility
//! and allow-list resolution, primitive record storage, and the versioned
//! weighted-average taxonomy aggregation for composed streams.
//!
//! Mutating procedures are applied synchronously; their outcome lands in a
//! receipt table that [`crate::MockLedgerClient::wait_for_tx`] polls, so
//! the confirm-before-next-step contract is still exercised end to end.

use crate::{procedures as proc, DatasetInfo, LedgerError, Result, Schema, TxHash, TxResult};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeSet, HashMap, HashSet};
use trellis_common::{dataset_ref, Address};
use trellis_value::Arg;
use uuid::Uuid;

/// Sentinel meaning "active from the beginning of history" for taxonomy
/// versions deployed without a start date.
const EPOCH: NaiveDate = NaiveDate::MIN;

#[derive(Debug, Clone)]
struct MetaRow {
    row_id: String,
    key: String,
    value_i: i64,
    value_b: bool,
    value_s: String,
    value_ref: String,
    created_at: u64,
    disabled: bool,
}

#[derive(Debug, Clone)]
struct RecordRow {
    date: NaiveDate,
    value: Decimal,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TaxonomyVersion {
    version: u64,
    start_date: Option<NaiveDate>,
    created_at: u64,
    items: Vec<VersionItem>,
}

#[derive(Debug, Clone)]
struct VersionItem {
    provider: Address,
    stream_id: String,
    weight: Decimal,
}

#[derive(Debug)]
struct Dataset {
    name: String,
    owner: Address,
    procedures: Vec<String>,
    metadata: Vec<MetaRow>,
    records: Vec<RecordRow>,
    taxonomies: Vec<TaxonomyVersion>,
}

impl Dataset {
    fn has_procedure(&self, name: &str) -> bool {
        self.procedures.iter().any(|p| p == name)
    }

    fn enabled_rows(&self, key: &str) -> impl Iterator<Item = &MetaRow> {
        let key = key.to_string();
        self.metadata
            .iter()
            .filter(move |row| !row.disabled && row.key == key)
    }

    fn latest_enabled(&self, key: &str) -> Option<&MetaRow> {
        self.enabled_rows(key).max_by_key(|row| row.created_at)
    }

    fn initialized(&self) -> bool {
        self.latest_enabled("type").is_some()
    }
}

#[derive(Default)]
struct LedgerState {
    height: u64,
    datasets: HashMap<String, Dataset>,
    receipts: HashMap<TxHash, TxResult>,
}

/// In-memory ledger shared by any number of [`crate::MockLedgerClient`]s
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a dataset owned by `caller`. Fails if the (name, owner)
    /// pair is already deployed.
    pub fn deploy_dataset(
        &self,
        caller: &Address,
        name: &str,
        procedures: Vec<String>,
    ) -> Result<TxHash> {
        let mut state = self.state.lock();
        let ds_ref = dataset_ref(name, caller);
        if state.datasets.contains_key(&ds_ref) {
            return Err(LedgerError::DatasetExists(ds_ref));
        }

        state.datasets.insert(
            ds_ref,
            Dataset {
                name: name.to_string(),
                owner: caller.clone(),
                procedures,
                metadata: Vec::new(),
                records: Vec::new(),
                taxonomies: Vec::new(),
            },
        );

        Ok(Self::settle(&mut state, Ok(())))
    }

    /// Drop a dataset owned by `caller`, removing all of its rows.
    pub fn drop_dataset(&self, caller: &Address, name: &str) -> Result<TxHash> {
        let mut state = self.state.lock();
        let ds_ref = dataset_ref(name, caller);
        if state.datasets.remove(&ds_ref).is_none() {
            return Err(LedgerError::DatasetNotFound(ds_ref));
        }
        Ok(Self::settle(&mut state, Ok(())))
    }

    pub fn get_schema(&self, ds_ref: &str) -> Result<Schema> {
        let state = self.state.lock();
        let ds = state
            .datasets
            .get(ds_ref)
            .ok_or_else(|| LedgerError::DatasetNotFound(ds_ref.to_string()))?;
        Ok(Schema {
            name: ds.name.clone(),
            owner: ds.owner.clone(),
            procedures: ds.procedures.clone(),
        })
    }

    pub fn list_datasets(&self, owner: Option<&Address>) -> Vec<DatasetInfo> {
        let state = self.state.lock();
        let mut out: Vec<DatasetInfo> = state
            .datasets
            .iter()
            .filter(|(_, ds)| owner.map_or(true, |o| ds.owner == *o))
            .map(|(ds_ref, ds)| DatasetInfo {
                dataset_ref: ds_ref.clone(),
                name: ds.name.clone(),
                owner: ds.owner.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn tx_result(&self, tx_hash: &TxHash) -> Option<TxResult> {
        self.state.lock().receipts.get(tx_hash).cloned()
    }

    /// Apply a state-changing procedure.
    ///
    /// Dataset and procedure resolution failures are transport-level
    /// errors; application failures settle into a failed receipt behind
    /// the returned hash, the way a broadcast transaction fails.
    pub fn execute(
        &self,
        caller: &Address,
        ds_ref: &str,
        procedure: &str,
        rows: Vec<Vec<Arg>>,
    ) -> Result<TxHash> {
        let mut state = self.state.lock();
        state.height += 1;
        let height = state.height;

        let ds = state
            .datasets
            .get_mut(ds_ref)
            .ok_or_else(|| LedgerError::DatasetNotFound(ds_ref.to_string()))?;
        if !ds.has_procedure(procedure) {
            return Err(LedgerError::ProcedureNotFound {
                dataset: ds_ref.to_string(),
                procedure: procedure.to_string(),
            });
        }

        let outcome = if ds.owner != *caller {
            Err("caller is not the dataset owner".to_string())
        } else {
            apply_procedure(ds, procedure, rows, height)
        };

        Ok(Self::settle(&mut state, outcome))
    }

    /// Invoke a read-only procedure.
    pub fn call(
        &self,
        caller: &Address,
        ds_ref: &str,
        procedure: &str,
        args: Vec<Arg>,
    ) -> Result<Vec<JsonValue>> {
        let state = self.state.lock();
        let ds = state
            .datasets
            .get(ds_ref)
            .ok_or_else(|| LedgerError::DatasetNotFound(ds_ref.to_string()))?;
        if !ds.has_procedure(procedure) {
            return Err(LedgerError::ProcedureNotFound {
                dataset: ds_ref.to_string(),
                procedure: procedure.to_string(),
            });
        }

        match procedure {
            proc::GET_METADATA => get_metadata(ds, &args),
            proc::DESCRIBE_TAXONOMIES => describe_taxonomies(ds, &args),
            proc::GET_RECORD => {
                check_read(ds, caller, ds_ref)?;
                get_record(&state, ds_ref, &args)
            }
            proc::GET_INDEX => {
                check_read(ds, caller, ds_ref)?;
                get_index(&state, ds_ref, &args)
            }
            proc::GET_FIRST_RECORD => {
                check_read(ds, caller, ds_ref)?;
                get_first_record(&state, ds_ref, &args)
            }
            other => Err(LedgerError::InvalidArguments(format!(
                "{other} is not a view procedure"
            ))),
        }
    }

    /// Mint a hash, record the receipt and hand the hash back.
    fn settle(state: &mut LedgerState, outcome: std::result::Result<(), String>) -> TxHash {
        let tx_hash = TxHash::new(format!("0x{}", Uuid::new_v4().simple()));
        let result = match outcome {
            Ok(()) => TxResult {
                tx_hash: tx_hash.clone(),
                success: true,
                log: String::new(),
            },
            Err(log) => {
                tracing::debug!(%tx_hash, %log, "transaction failed at application");
                TxResult {
                    tx_hash: tx_hash.clone(),
                    success: false,
                    log,
                }
            }
        };
        state.receipts.insert(tx_hash.clone(), result);
        tx_hash
    }
}

// ---------------------------------------------------------------------------
// Write procedures
// ---------------------------------------------------------------------------

fn apply_procedure(
    ds: &mut Dataset,
    procedure: &str,
    rows: Vec<Vec<Arg>>,
    height: u64,
) -> std::result::Result<(), String> {
    match procedure {
        proc::INIT => apply_init(ds, height),
        proc::INSERT_METADATA => apply_insert_metadata(ds, rows, height),
        proc::DISABLE_METADATA => apply_disable_metadata(ds, rows),
        proc::INSERT_RECORD => apply_insert_record(ds, rows),
        proc::SET_TAXONOMY => apply_set_taxonomy(ds, rows, height),
        other => Err(format!("{other} is not a write procedure")),
    }
}

fn build_meta_row(
    key: &str,
    kind: &str,
    value: &str,
    height: u64,
) -> std::result::Result<MetaRow, String> {
    let mut row = MetaRow {
        row_id: Uuid::new_v4().to_string(),
        key: key.to_string(),
        value_i: 0,
        value_b: false,
        value_s: String::new(),
        value_ref: String::new(),
        created_at: height,
        disabled: false,
    };
    match kind {
        "int" => {
            row.value_i = value
                .parse()
                .map_err(|_| format!("invalid int value for {key}: {value}"))?
        }
        "bool" => {
            row.value_b = value
                .parse()
                .map_err(|_| format!("invalid bool value for {key}: {value}"))?
        }
        "string" => row.value_s = value.to_string(),
        "ref" => row.value_ref = value.to_string(),
        other => return Err(format!("unsupported metadata type: {other}")),
    }
    Ok(row)
}

fn apply_init(ds: &mut Dataset, height: u64) -> std::result::Result<(), String> {
    if ds.initialized() {
        return Err("stream is already initialized".to_string());
    }
    // the deployed procedure set decides which kind of stream this is
    let kind = if ds.has_procedure(proc::INSERT_RECORD) {
        "primitive"
    } else {
        "composed"
    };
    let staged = [
        build_meta_row("type", "string", kind, height)?,
        build_meta_row("stream_owner", "ref", ds.owner.bare_hex(), height)?,
    ];
    ds.metadata.extend(staged);
    Ok(())
}

fn require_initialized(ds: &Dataset) -> std::result::Result<(), String> {
    if ds.initialized() {
        Ok(())
    } else {
        Err("stream is not initialized".to_string())
    }
}

fn apply_insert_metadata(
    ds: &mut Dataset,
    rows: Vec<Vec<Arg>>,
    height: u64,
) -> std::result::Result<(), String> {
    require_initialized(ds)?;
    // stage everything before touching the dataset; a failed transaction
    // must leave no rows behind
    let mut staged = Vec::with_capacity(rows.len());
    for row in rows {
        let [key, value, kind] = row.as_slice() else {
            return Err("insert_metadata expects (key, value, type) tuples".to_string());
        };
        let (Some(key), Some(value), Some(kind)) =
            (key.as_text(), value.as_text(), kind.as_text())
        else {
            return Err("insert_metadata arguments must be text".to_string());
        };
        staged.push(build_meta_row(key, kind, value, height)?);
    }
    ds.metadata.extend(staged);
    Ok(())
}

fn apply_disable_metadata(
    ds: &mut Dataset,
    rows: Vec<Vec<Arg>>,
) -> std::result::Result<(), String> {
    require_initialized(ds)?;
    // resolve every row id before disabling anything
    let mut indices = Vec::with_capacity(rows.len());
    for row in rows {
        let [row_id] = row.as_slice() else {
            return Err("disable_metadata expects a single row id".to_string());
        };
        let Some(row_id) = row_id.as_text() else {
            return Err("disable_metadata row id must be text".to_string());
        };
        let index = ds
            .metadata
            .iter()
            .position(|m| m.row_id == row_id)
            .ok_or_else(|| format!("metadata row not found: {row_id}"))?;
        indices.push(index);
    }
    for index in indices {
        // disabling twice is not an error at this layer
        ds.metadata[index].disabled = true;
    }
    Ok(())
}

fn apply_insert_record(ds: &mut Dataset, rows: Vec<Vec<Arg>>) -> std::result::Result<(), String> {
    require_initialized(ds)?;
    // stage everything before touching the dataset; a failed transaction
    // must leave no rows behind
    let mut staged = Vec::with_capacity(rows.len());
    for row in rows {
        let [date, value] = row.as_slice() else {
            return Err("insert_record expects (date, value) tuples".to_string());
        };
        let (Some(date), Some(value)) = (date.as_text(), value.as_text()) else {
            return Err("insert_record arguments must be text".to_string());
        };
        let date: NaiveDate = date
            .parse()
            .map_err(|_| format!("invalid record date: {date}"))?;
        let value: Decimal = value
            .parse()
            .map_err(|_| format!("invalid record value: {value}"))?;
        staged.push(RecordRow {
            date,
            value,
            inserted_at: Utc::now(),
        });
    }
    ds.records.extend(staged);
    Ok(())
}

fn apply_set_taxonomy(
    ds: &mut Dataset,
    rows: Vec<Vec<Arg>>,
    height: u64,
) -> std::result::Result<(), String> {
    require_initialized(ds)?;
    let [row] = rows.as_slice() else {
        return Err("set_taxonomy expects exactly one argument row".to_string());
    };
    let [providers, stream_ids, weights, start_date] = row.as_slice() else {
        return Err("set_taxonomy expects (providers, stream_ids, weights, start_date)".to_string());
    };
    let (Some(providers), Some(stream_ids), Some(weights)) = (
        providers.as_text_array(),
        stream_ids.as_text_array(),
        weights.as_text_array(),
    ) else {
        return Err("set_taxonomy array arguments must be text arrays".to_string());
    };
    if providers.len() != stream_ids.len() || providers.len() != weights.len() {
        return Err("set_taxonomy arrays must have equal lengths".to_string());
    }
    let start_date = match start_date {
        Arg::Null => None,
        Arg::Date(d) => Some(*d),
        _ => return Err("set_taxonomy start date must be a date or null".to_string()),
    };

    let mut items = Vec::with_capacity(providers.len());
    for ((provider, stream_id), weight) in providers.iter().zip(stream_ids).zip(weights) {
        let provider = Address::new(provider)
            .map_err(|e| format!("invalid taxonomy data provider: {e}"))?;
        let weight: Decimal = weight
            .parse()
            .map_err(|_| format!("invalid taxonomy weight: {weight}"))?;
        if weight < Decimal::ZERO {
            return Err(format!("taxonomy weight must be non-negative, got {weight}"));
        }
        items.push(VersionItem {
            provider,
            stream_id: stream_id.clone(),
            weight,
        });
    }

    let version = ds.taxonomies.len() as u64 + 1;
    ds.taxonomies.push(TaxonomyVersion {
        version,
        start_date,
        created_at: height,
        items,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Access resolution
// ---------------------------------------------------------------------------

/// A read of a stream succeeds iff the caller owns it, read visibility is
/// not private, or the caller is on the read allow-list.
fn check_read(ds: &Dataset, caller: &Address, ds_ref: &str) -> Result<()> {
    if ds.owner == *caller {
        return Ok(());
    }
    let private = ds
        .latest_enabled("read_visibility")
        .map_or(false, |row| row.value_i == 1);
    if !private {
        return Ok(());
    }
    let allowed = ds
        .enabled_rows("allow_read_wallet")
        .any(|row| row.value_ref == caller.as_str());
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::NotAuthorized {
            dataset: ds_ref.to_string(),
            caller: caller.to_string(),
        })
    }
}

/// A composed stream may resolve a child iff the child's compose
/// visibility is not private or the composing stream's dataset ref is on
/// the child's compose allow-list. Independent of the caller's read check.
fn check_compose(child: &Dataset, child_ref: &str, parent_ref: &str) -> Result<()> {
    let private = child
        .latest_enabled("compose_visibility")
        .map_or(false, |row| row.value_i == 1);
    if !private {
        return Ok(());
    }
    let allowed = child
        .enabled_rows("allow_compose_stream")
        .any(|row| row.value_ref == parent_ref);
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::NotAuthorized {
            dataset: child_ref.to_string(),
            caller: parent_ref.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// View procedures
// ---------------------------------------------------------------------------

fn get_metadata(ds: &Dataset, args: &[Arg]) -> Result<Vec<JsonValue>> {
    let [key, only_latest, value_ref] = args else {
        return Err(LedgerError::InvalidArguments(
            "get_metadata expects (key, only_latest, ref)".to_string(),
        ));
    };
    let key = key.as_text().ok_or_else(|| {
        LedgerError::InvalidArguments("get_metadata key must be text".to_string())
    })?;
    let only_latest = only_latest.as_bool().ok_or_else(|| {
        LedgerError::InvalidArguments("get_metadata only_latest must be bool".to_string())
    })?;
    let value_ref = match value_ref {
        Arg::Null => None,
        Arg::Text(s) => Some(s.as_str()),
        _ => {
            return Err(LedgerError::InvalidArguments(
                "get_metadata ref must be text or null".to_string(),
            ))
        }
    };

    let mut rows: Vec<&MetaRow> = ds
        .enabled_rows(key)
        .filter(|row| value_ref.map_or(true, |r| row.value_ref == r))
        .collect();
    // newest first; the latest row is always rows[0]
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if only_latest {
        rows.truncate(1);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            json!({
                "row_id": row.row_id,
                "value_i": row.value_i,
                "value_b": row.value_b,
                "value_s": row.value_s,
                "value_ref": row.value_ref,
                "created_at": row.created_at,
            })
        })
        .collect())
}

fn describe_taxonomies(ds: &Dataset, args: &[Arg]) -> Result<Vec<JsonValue>> {
    let [latest_only] = args else {
        return Err(LedgerError::InvalidArguments(
            "describe_taxonomies expects (latest_only)".to_string(),
        ));
    };
    let latest_only = latest_only.as_bool().ok_or_else(|| {
        LedgerError::InvalidArguments("describe_taxonomies latest_only must be bool".to_string())
    })?;

    let versions: Vec<&TaxonomyVersion> = if latest_only {
        ds.taxonomies.last().into_iter().collect()
    } else {
        ds.taxonomies.iter().collect()
    };

    let mut rows = Vec::new();
    for version in versions {
        for item in &version.items {
            rows.push(json!({
                "child_stream_id": item.stream_id,
                "child_data_provider": item.provider.as_str(),
                "weight": item.weight.to_string(),
                "created_at": version.created_at,
                "version": version.version,
                "start_date": version
                    .start_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            }));
        }
    }
    Ok(rows)
}

struct RecordQueryArgs {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    frozen_at: Option<DateTime<Utc>>,
}

fn parse_opt_date(arg: &Arg, what: &str) -> Result<Option<NaiveDate>> {
    match arg {
        Arg::Null => Ok(None),
        Arg::Date(d) => Ok(Some(*d)),
        _ => Err(LedgerError::InvalidArguments(format!(
            "{what} must be a date or null"
        ))),
    }
}

fn parse_opt_timestamp(arg: &Arg, what: &str) -> Result<Option<DateTime<Utc>>> {
    match arg {
        Arg::Null => Ok(None),
        Arg::Timestamp(t) => Ok(Some(*t)),
        _ => Err(LedgerError::InvalidArguments(format!(
            "{what} must be a timestamp or null"
        ))),
    }
}

fn get_record(state: &LedgerState, ds_ref: &str, args: &[Arg]) -> Result<Vec<JsonValue>> {
    let [date_from, date_to, frozen_at] = args else {
        return Err(LedgerError::InvalidArguments(
            "get_record expects (date_from, date_to, frozen_at)".to_string(),
        ));
    };
    let query = RecordQueryArgs {
        date_from: parse_opt_date(date_from, "date_from")?,
        date_to: parse_opt_date(date_to, "date_to")?,
        frozen_at: parse_opt_timestamp(frozen_at, "frozen_at")?,
    };

    let mut visited = HashSet::new();
    let dates = candidate_dates(state, ds_ref, &query, &mut visited)?;

    let mut rows = Vec::new();
    for date in dates {
        let mut visited = HashSet::new();
        if let Some(value) = value_at(state, ds_ref, date, query.frozen_at, &mut visited)? {
            rows.push(record_row(date, value));
        }
    }
    Ok(rows)
}

fn get_index(state: &LedgerState, ds_ref: &str, args: &[Arg]) -> Result<Vec<JsonValue>> {
    let [date_from, date_to, frozen_at, base_date] = args else {
        return Err(LedgerError::InvalidArguments(
            "get_index expects (date_from, date_to, frozen_at, base_date)".to_string(),
        ));
    };
    let query = RecordQueryArgs {
        date_from: parse_opt_date(date_from, "date_from")?,
        date_to: parse_opt_date(date_to, "date_to")?,
        frozen_at: parse_opt_timestamp(frozen_at, "frozen_at")?,
    };
    let base_override = parse_opt_date(base_date, "base_date")?;

    let mut visited = HashSet::new();
    let dates = candidate_dates(state, ds_ref, &query, &mut visited)?;

    let mut rows = Vec::new();
    for date in dates {
        let mut visited = HashSet::new();
        if let Some(value) =
            index_at(state, ds_ref, date, query.frozen_at, base_override, &mut visited)?
        {
            rows.push(record_row(date, value));
        }
    }
    Ok(rows)
}

fn get_first_record(state: &LedgerState, ds_ref: &str, args: &[Arg]) -> Result<Vec<JsonValue>> {
    let [after_date, frozen_at] = args else {
        return Err(LedgerError::InvalidArguments(
            "get_first_record expects (after_date, frozen_at)".to_string(),
        ));
    };
    let query = RecordQueryArgs {
        date_from: parse_opt_date(after_date, "after_date")?,
        date_to: None,
        frozen_at: parse_opt_timestamp(frozen_at, "frozen_at")?,
    };

    let mut visited = HashSet::new();
    let dates = candidate_dates(state, ds_ref, &query, &mut visited)?;

    for date in dates {
        let mut visited = HashSet::new();
        if let Some(value) = value_at(state, ds_ref, date, query.frozen_at, &mut visited)? {
            return Ok(vec![record_row(date, value)]);
        }
    }
    Ok(Vec::new())
}

fn record_row(date: NaiveDate, value: Decimal) -> JsonValue {
    json!({
        "date_value": date.to_string(),
        "value": value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

fn dataset<'a>(state: &'a LedgerState, ds_ref: &str) -> Result<&'a Dataset> {
    state
        .datasets
        .get(ds_ref)
        .ok_or_else(|| LedgerError::DatasetNotFound(ds_ref.to_string()))
}

fn frozen_records<'a>(
    ds: &'a Dataset,
    frozen_at: Option<DateTime<Utc>>,
) -> impl Iterator<Item = &'a RecordRow> {
    ds.records
        .iter()
        .filter(move |r| frozen_at.map_or(true, |cutoff| r.inserted_at <= cutoff))
}

/// The taxonomy version active at `date`: the greatest effective start
/// date not after `date`, ties broken by the higher version number
/// (later insertion wins).
fn active_version(ds: &Dataset, date: NaiveDate) -> Option<&TaxonomyVersion> {
    ds.taxonomies
        .iter()
        .filter(|v| v.start_date.unwrap_or(EPOCH) <= date)
        .max_by_key(|v| (v.start_date.unwrap_or(EPOCH), v.version))
}

fn enter(visited: &mut HashSet<String>, ds_ref: &str) -> Result<()> {
    if !visited.insert(ds_ref.to_string()) {
        return Err(LedgerError::CircularTaxonomy(ds_ref.to_string()));
    }
    Ok(())
}

/// Dates at which this stream can answer a record query within the range.
/// For primitives these are its own record dates; for composed streams the
/// union over the children of every version.
fn candidate_dates(
    state: &LedgerState,
    ds_ref: &str,
    query: &RecordQueryArgs,
    visited: &mut HashSet<String>,
) -> Result<BTreeSet<NaiveDate>> {
    enter(visited, ds_ref)?;
    let ds = dataset(state, ds_ref)?;

    let in_range = |d: NaiveDate| {
        query.date_from.map_or(true, |from| d >= from) && query.date_to.map_or(true, |to| d <= to)
    };

    let mut dates = BTreeSet::new();
    if ds.has_procedure(proc::INSERT_RECORD) {
        for record in frozen_records(ds, query.frozen_at) {
            if in_range(record.date) {
                dates.insert(record.date);
            }
        }
    } else {
        for version in &ds.taxonomies {
            for item in &version.items {
                let child_ref = dataset_ref(&item.stream_id, &item.provider);
                let mut child_visited = visited.clone();
                dates.extend(candidate_dates(state, &child_ref, query, &mut child_visited)?);
            }
        }
    }
    Ok(dates)
}

/// Value of a stream at `date`, filling forward from the latest record at
/// or before the date. Composed streams resolve the version active at the
/// date and take the weighted average over children that have a value;
/// children without one are excluded from numerator and denominator.
fn value_at(
    state: &LedgerState,
    ds_ref: &str,
    date: NaiveDate,
    frozen_at: Option<DateTime<Utc>>,
    visited: &mut HashSet<String>,
) -> Result<Option<Decimal>> {
    enter(visited, ds_ref)?;
    let ds = dataset(state, ds_ref)?;

    if ds.has_procedure(proc::INSERT_RECORD) {
        // latest record at or before the date; a later insert for the same
        // date supersedes the earlier one
        let latest = frozen_records(ds, frozen_at)
            .filter(|r| r.date <= date)
            .max_by_key(|r| (r.date, r.inserted_at));
        return Ok(latest.map(|r| r.value));
    }

    let Some(version) = active_version(ds, date) else {
        return Ok(None);
    };

    let mut weighted_sum = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    let mut contributed = false;
    for item in &version.items {
        let child_ref = dataset_ref(&item.stream_id, &item.provider);
        let child = dataset(state, &child_ref)?;
        check_compose(child, &child_ref, ds_ref)?;

        let mut child_visited = visited.clone();
        if let Some(value) = value_at(state, &child_ref, date, frozen_at, &mut child_visited)? {
            weighted_sum += value * item.weight;
            total_weight += item.weight;
            contributed = true;
        }
    }

    if !contributed {
        return Ok(None);
    }
    let value = weighted_sum
        .checked_div(total_weight)
        .ok_or_else(|| LedgerError::Aggregation("total taxonomy weight is zero".to_string()))?;
    Ok(Some(value))
}

/// Base date for index rebasing: the caller's override, else the stream's
/// `default_base_date` metadata, else the date of its first record.
fn base_date_for(
    state: &LedgerState,
    ds_ref: &str,
    frozen_at: Option<DateTime<Utc>>,
    base_override: Option<NaiveDate>,
) -> Result<Option<NaiveDate>> {
    if base_override.is_some() {
        return Ok(base_override);
    }
    let ds = dataset(state, ds_ref)?;
    if let Some(row) = ds.latest_enabled("default_base_date") {
        let date: NaiveDate = row.value_s.parse().map_err(|_| {
            LedgerError::Aggregation(format!("invalid default_base_date: {}", row.value_s))
        })?;
        return Ok(Some(date));
    }
    let query = RecordQueryArgs {
        date_from: None,
        date_to: None,
        frozen_at,
    };
    let mut visited = HashSet::new();
    Ok(candidate_dates(state, ds_ref, &query, &mut visited)?
        .into_iter()
        .next())
}

/// Index of a stream at `date`: 100 at the base date, other dates as a
/// percentage of the base value. Composed indexes are the weighted average
/// of the children's indexes, each child rebased against its own base.
fn index_at(
    state: &LedgerState,
    ds_ref: &str,
    date: NaiveDate,
    frozen_at: Option<DateTime<Utc>>,
    base_override: Option<NaiveDate>,
    visited: &mut HashSet<String>,
) -> Result<Option<Decimal>> {
    enter(visited, ds_ref)?;
    let ds = dataset(state, ds_ref)?;

    if ds.has_procedure(proc::INSERT_RECORD) {
        let mut value_visited = HashSet::new();
        let Some(value) = value_at(state, ds_ref, date, frozen_at, &mut value_visited)? else {
            return Ok(None);
        };
        let Some(base_date) = base_date_for(state, ds_ref, frozen_at, base_override)? else {
            return Ok(None);
        };
        let mut base_visited = HashSet::new();
        let base_value = value_at(state, ds_ref, base_date, frozen_at, &mut base_visited)?
            .ok_or_else(|| {
                LedgerError::Aggregation(format!("no record at base date {base_date}"))
            })?;
        let ratio = value.checked_div(base_value).ok_or_else(|| {
            LedgerError::Aggregation(format!("base value at {base_date} is zero"))
        })?;
        return Ok(Some(ratio * Decimal::ONE_HUNDRED));
    }

    let Some(version) = active_version(ds, date) else {
        return Ok(None);
    };

    let mut weighted_sum = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    let mut contributed = false;
    for item in &version.items {
        let child_ref = dataset_ref(&item.stream_id, &item.provider);
        let child = dataset(state, &child_ref)?;
        check_compose(child, &child_ref, ds_ref)?;

        let mut child_visited = visited.clone();
        if let Some(index) = index_at(
            state,
            &child_ref,
            date,
            frozen_at,
            base_override,
            &mut child_visited,
        )? {
            weighted_sum += index * item.weight;
            total_weight += item.weight;
            contributed = true;
        }
    }

    if !contributed {
        return Ok(None);
    }
    let value = weighted_sum
        .checked_div(total_weight)
        .ok_or_else(|| LedgerError::Aggregation("total taxonomy weight is zero".to_string()))?;
    Ok(Some(value))
}
