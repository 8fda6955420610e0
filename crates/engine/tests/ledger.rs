//! Integration tests for the mock ledger procedure contracts

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use trellis_common::{dataset_ref, Address};
use trellis_engine::{
    procedures, LedgerClient, LedgerError, MockLedger, MockLedgerClient, TxHash,
};
use trellis_value::Arg;

fn owner() -> Address {
    Address::new("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf").unwrap()
}

fn other() -> Address {
    Address::new("0x2b5ad5c4795c026514f8317c7a215e218dccd6cf").unwrap()
}

fn d(s: &str) -> chrono::NaiveDate {
    s.parse().unwrap()
}

fn client(caller: Address, ledger: &Arc<MockLedger>) -> MockLedgerClient {
    MockLedgerClient::new(caller, ledger.clone())
}

async fn confirm(client: &MockLedgerClient, tx: &TxHash) -> trellis_engine::TxResult {
    client.wait_for_tx(tx, Duration::from_millis(1)).await.unwrap()
}

async fn confirm_ok(client: &MockLedgerClient, tx: &TxHash) {
    let result = confirm(client, tx).await;
    assert!(result.success, "tx failed: {}", result.log);
}

async fn deploy_stream(client: &MockLedgerClient, name: &str, procs: Vec<String>) -> String {
    let tx = client.deploy_dataset(name, procs).await.unwrap();
    confirm_ok(client, &tx).await;
    let ds_ref = dataset_ref(name, client.caller());
    let tx = client.execute(&ds_ref, procedures::INIT, vec![]).await.unwrap();
    confirm_ok(client, &tx).await;
    ds_ref
}

async fn insert_records(client: &MockLedgerClient, ds_ref: &str, records: &[(&str, &str)]) {
    let rows = records
        .iter()
        .map(|(date, value)| vec![Arg::from(*date), Arg::from(*value)])
        .collect();
    let tx = client
        .execute(ds_ref, procedures::INSERT_RECORD, rows)
        .await
        .unwrap();
    confirm_ok(client, &tx).await;
}

async fn set_metadata(client: &MockLedgerClient, ds_ref: &str, key: &str, kind: &str, value: &str) {
    let tx = client
        .execute(
            ds_ref,
            procedures::INSERT_METADATA,
            vec![vec![Arg::from(key), Arg::from(value), Arg::from(kind)]],
        )
        .await
        .unwrap();
    confirm_ok(client, &tx).await;
}

async fn set_taxonomy(
    client: &MockLedgerClient,
    ds_ref: &str,
    items: &[(&Address, &str, Decimal)],
    start_date: Option<&str>,
) {
    let providers = items.iter().map(|(p, _, _)| p.as_str().to_string()).collect();
    let stream_ids = items.iter().map(|(_, id, _)| id.to_string()).collect();
    let weights = items.iter().map(|(_, _, w)| w.to_string()).collect();
    let tx = client
        .execute(
            ds_ref,
            procedures::SET_TAXONOMY,
            vec![vec![
                Arg::TextArray(providers),
                Arg::TextArray(stream_ids),
                Arg::TextArray(weights),
                Arg::opt(start_date.map(d)),
            ]],
        )
        .await
        .unwrap();
    confirm_ok(client, &tx).await;
}

async fn get_record_values(
    client: &MockLedgerClient,
    ds_ref: &str,
) -> Vec<(String, Decimal)> {
    let rows = client
        .call(
            ds_ref,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap();
    rows.iter()
        .map(|row| {
            (
                row["date_value"].as_str().unwrap().to_string(),
                row["value"].as_str().unwrap().parse().unwrap(),
            )
        })
        .collect()
}

async fn get_index_values(client: &MockLedgerClient, ds_ref: &str) -> Vec<(String, Decimal)> {
    let rows = client
        .call(
            ds_ref,
            procedures::GET_INDEX,
            vec![Arg::Null, Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap();
    rows.iter()
        .map(|row| {
            (
                row["date_value"].as_str().unwrap().to_string(),
                row["value"].as_str().unwrap().parse().unwrap(),
            )
        })
        .collect()
}

#[tokio::test]
async fn primitive_roundtrip() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let ds_ref = deploy_stream(&client, "prices", procedures::primitive_template()).await;
    insert_records(&client, &ds_ref, &[("2021-01-01", "1"), ("2021-01-02", "2")]).await;

    let rows = get_record_values(&client, &ds_ref).await;
    assert_eq!(
        rows,
        vec![
            ("2021-01-01".to_string(), dec!(1)),
            ("2021-01-02".to_string(), dec!(2)),
        ]
    );

    // first record honors the after-date bound
    let rows = client
        .call(
            &ds_ref,
            procedures::GET_FIRST_RECORD,
            vec![Arg::from(d("2021-01-02")), Arg::Null],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date_value"], "2021-01-02");

    let rows = client
        .call(
            &ds_ref,
            procedures::GET_FIRST_RECORD,
            vec![Arg::from(d("2021-01-03")), Arg::Null],
        )
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn init_is_once_and_gates_writes() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let tx = client
        .deploy_dataset("prices", procedures::primitive_template())
        .await
        .unwrap();
    confirm_ok(&client, &tx).await;
    let ds_ref = dataset_ref("prices", client.caller());

    // writes before init settle as failed transactions
    let tx = client
        .execute(
            &ds_ref,
            procedures::INSERT_RECORD,
            vec![vec![Arg::from("2021-01-01"), Arg::from("1")]],
        )
        .await
        .unwrap();
    assert!(!confirm(&client, &tx).await.success);

    let tx = client.execute(&ds_ref, procedures::INIT, vec![]).await.unwrap();
    confirm_ok(&client, &tx).await;

    let tx = client.execute(&ds_ref, procedures::INIT, vec![]).await.unwrap();
    let result = confirm(&client, &tx).await;
    assert!(!result.success);
    assert!(result.log.contains("already initialized"));
}

#[tokio::test]
async fn non_owner_writes_are_rejected() {
    let ledger = Arc::new(MockLedger::new());
    let owner_client = client(owner(), &ledger);
    let other_client = client(other(), &ledger);

    let ds_ref = deploy_stream(&owner_client, "prices", procedures::primitive_template()).await;

    let tx = other_client
        .execute(
            &ds_ref,
            procedures::INSERT_RECORD,
            vec![vec![Arg::from("2021-01-01"), Arg::from("1")]],
        )
        .await
        .unwrap();
    let result = confirm(&other_client, &tx).await;
    assert!(!result.success);
    assert!(result.log.contains("not the dataset owner"));
}

#[tokio::test]
async fn failed_batch_writes_leave_nothing_behind() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);
    let ds_ref = deploy_stream(&client, "prices", procedures::primitive_template()).await;

    // one valid tuple followed by one with an unparseable int value
    let tx = client
        .execute(
            &ds_ref,
            procedures::INSERT_METADATA,
            vec![
                vec![Arg::from("read_visibility"), Arg::from("1"), Arg::from("int")],
                vec![
                    Arg::from("compose_visibility"),
                    Arg::from("not-an-int"),
                    Arg::from("int"),
                ],
            ],
        )
        .await
        .unwrap();
    assert!(!confirm(&client, &tx).await.success);

    let rows = client
        .call(
            &ds_ref,
            procedures::GET_METADATA,
            vec![Arg::from("read_visibility"), Arg::from(false), Arg::Null],
        )
        .await
        .unwrap();
    assert!(rows.is_empty(), "failed tx left metadata rows behind");

    // same contract for record batches
    let tx = client
        .execute(
            &ds_ref,
            procedures::INSERT_RECORD,
            vec![
                vec![Arg::from("2021-01-01"), Arg::from("1")],
                vec![Arg::from("2021-01-02"), Arg::from("not-a-decimal")],
            ],
        )
        .await
        .unwrap();
    assert!(!confirm(&client, &tx).await.success);
    assert!(get_record_values(&client, &ds_ref).await.is_empty());
}

#[tokio::test]
async fn frozen_at_excludes_later_inserts() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);
    let ds_ref = deploy_stream(&client, "prices", procedures::primitive_template()).await;

    insert_records(&client, &ds_ref, &[("2021-01-01", "1")]).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let cutoff = chrono::Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    insert_records(&client, &ds_ref, &[("2021-01-01", "2"), ("2021-01-02", "3")]).await;

    // unfrozen: the later insert supersedes the first day's value
    let rows = get_record_values(&client, &ds_ref).await;
    assert_eq!(
        rows,
        vec![
            ("2021-01-01".to_string(), dec!(2)),
            ("2021-01-02".to_string(), dec!(3)),
        ]
    );

    // frozen at the cutoff: only the first insert is visible
    let rows = client
        .call(
            &ds_ref,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::from(cutoff)],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["date_value"], "2021-01-01");
    assert_eq!(rows[0]["value"], "1");
}

#[tokio::test]
async fn metadata_history_and_disable() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);
    let ds_ref = deploy_stream(&client, "prices", procedures::primitive_template()).await;

    set_metadata(&client, &ds_ref, "read_visibility", "int", "1").await;
    set_metadata(&client, &ds_ref, "read_visibility", "int", "0").await;

    // latest wins
    let rows = client
        .call(
            &ds_ref,
            procedures::GET_METADATA,
            vec![Arg::from("read_visibility"), Arg::from(true), Arg::Null],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value_i"], 0);

    // history is preserved, newest first
    let rows = client
        .call(
            &ds_ref,
            procedures::GET_METADATA,
            vec![Arg::from("read_visibility"), Arg::from(false), Arg::Null],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["value_i"], 0);
    assert_eq!(rows[1]["value_i"], 1);

    // disabling the latest row resurfaces the earlier one
    let row_id = rows[0]["row_id"].as_str().unwrap().to_string();
    let tx = client
        .execute(
            &ds_ref,
            procedures::DISABLE_METADATA,
            vec![vec![Arg::from(row_id)]],
        )
        .await
        .unwrap();
    confirm_ok(&client, &tx).await;

    let rows = client
        .call(
            &ds_ref,
            procedures::GET_METADATA,
            vec![Arg::from("read_visibility"), Arg::from(true), Arg::Null],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value_i"], 1);
}

#[tokio::test]
async fn read_visibility_gates_non_owners() {
    let ledger = Arc::new(MockLedger::new());
    let owner_client = client(owner(), &ledger);
    let reader_client = client(other(), &ledger);

    let ds_ref = deploy_stream(&owner_client, "prices", procedures::primitive_template()).await;
    insert_records(&owner_client, &ds_ref, &[("2021-01-01", "1")]).await;
    set_metadata(&owner_client, &ds_ref, "read_visibility", "int", "1").await;

    // the owner always reads
    assert_eq!(get_record_values(&owner_client, &ds_ref).await.len(), 1);

    let err = reader_client
        .call(
            &ds_ref,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized { .. }));

    // allow-listing the wallet opens the gate
    set_metadata(
        &owner_client,
        &ds_ref,
        "allow_read_wallet",
        "ref",
        other().as_str(),
    )
    .await;
    assert_eq!(get_record_values(&reader_client, &ds_ref).await.len(), 1);

    // revoking by disabling the allow row closes it again
    let rows = owner_client
        .call(
            &ds_ref,
            procedures::GET_METADATA,
            vec![
                Arg::from("allow_read_wallet"),
                Arg::from(false),
                Arg::from(other().as_str()),
            ],
        )
        .await
        .unwrap();
    let row_id = rows[0]["row_id"].as_str().unwrap().to_string();
    let tx = owner_client
        .execute(
            &ds_ref,
            procedures::DISABLE_METADATA,
            vec![vec![Arg::from(row_id)]],
        )
        .await
        .unwrap();
    confirm_ok(&owner_client, &tx).await;

    let err = reader_client
        .call(
            &ds_ref,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized { .. }));
}

#[tokio::test]
async fn composed_weighted_average_and_index() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let a = deploy_stream(&client, "child-a", procedures::primitive_template()).await;
    let b = deploy_stream(&client, "child-b", procedures::primitive_template()).await;
    insert_records(&client, &a, &[("2021-01-01", "1"), ("2021-01-02", "2")]).await;
    insert_records(&client, &b, &[("2021-01-01", "3"), ("2021-01-02", "4")]).await;

    let composed = deploy_stream(&client, "basket", procedures::composed_template()).await;
    let owner_addr = owner();
    set_taxonomy(
        &client,
        &composed,
        &[
            (&owner_addr, "child-a", dec!(1)),
            (&owner_addr, "child-b", dec!(2)),
        ],
        None,
    )
    .await;

    // (1*1 + 3*2) / 3 and (2*1 + 4*2) / 3
    let rows = get_record_values(&client, &composed).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1.round_dp(6), dec!(2.333333));
    assert_eq!(rows[1].1.round_dp(6), dec!(3.333333));

    // index is 100 at the base date; day two is the weighted average of
    // the children's own indexes: (200*1 + 133.33*2) / 3
    let rows = get_index_values(&client, &composed).await;
    assert_eq!(rows[0].1.round_dp(6), dec!(100));
    assert_eq!(rows[1].1.round_dp(6), dec!(155.555556));
}

#[tokio::test]
async fn composed_fills_forward_sparse_children() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let a = deploy_stream(&client, "child-a", procedures::primitive_template()).await;
    let b = deploy_stream(&client, "child-b", procedures::primitive_template()).await;
    insert_records(&client, &a, &[("2021-01-01", "2")]).await;
    insert_records(&client, &b, &[("2021-01-02", "4")]).await;

    let composed = deploy_stream(&client, "basket", procedures::composed_template()).await;
    let owner_addr = owner();
    set_taxonomy(
        &client,
        &composed,
        &[
            (&owner_addr, "child-a", dec!(1)),
            (&owner_addr, "child-b", dec!(1)),
        ],
        None,
    )
    .await;

    let rows = get_record_values(&client, &composed).await;
    // day one: only child-a has a value, so it alone defines the average;
    // day two: child-a fills forward to 2
    assert_eq!(
        rows,
        vec![
            ("2021-01-01".to_string(), dec!(2)),
            ("2021-01-02".to_string(), dec!(3)),
        ]
    );
}

#[tokio::test]
async fn taxonomy_versions_switch_by_start_date() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let a = deploy_stream(&client, "child-a", procedures::primitive_template()).await;
    let b = deploy_stream(&client, "child-b", procedures::primitive_template()).await;
    insert_records(&client, &a, &[("2021-01-01", "10"), ("2021-01-02", "10")]).await;
    insert_records(&client, &b, &[("2021-01-01", "20"), ("2021-01-02", "20")]).await;

    let composed = deploy_stream(&client, "basket", procedures::composed_template()).await;
    let owner_addr = owner();
    set_taxonomy(&client, &composed, &[(&owner_addr, "child-a", dec!(1))], None).await;
    set_taxonomy(
        &client,
        &composed,
        &[(&owner_addr, "child-b", dec!(1))],
        Some("2021-01-02"),
    )
    .await;

    let rows = get_record_values(&client, &composed).await;
    assert_eq!(
        rows,
        vec![
            ("2021-01-01".to_string(), dec!(10)),
            ("2021-01-02".to_string(), dec!(20)),
        ]
    );

    // same start date: the later version wins
    set_taxonomy(
        &client,
        &composed,
        &[(&owner_addr, "child-a", dec!(1))],
        Some("2021-01-02"),
    )
    .await;
    let rows = get_record_values(&client, &composed).await;
    assert_eq!(rows[1].1, dec!(10));
}

#[tokio::test]
async fn compose_visibility_gates_parent_streams() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let child = deploy_stream(&client, "child-a", procedures::primitive_template()).await;
    insert_records(&client, &child, &[("2021-01-01", "1")]).await;
    set_metadata(&client, &child, "compose_visibility", "int", "1").await;

    let composed = deploy_stream(&client, "basket", procedures::composed_template()).await;
    let owner_addr = owner();
    set_taxonomy(&client, &composed, &[(&owner_addr, "child-a", dec!(1))], None).await;

    // composing is gated even for the child's owner
    let err = client
        .call(
            &composed,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotAuthorized { .. }));

    set_metadata(&client, &child, "allow_compose_stream", "ref", &composed).await;
    assert_eq!(get_record_values(&client, &composed).await.len(), 1);
}

#[tokio::test]
async fn circular_taxonomies_are_detected() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let a = deploy_stream(&client, "basket-a", procedures::composed_template()).await;
    let b = deploy_stream(&client, "basket-b", procedures::composed_template()).await;
    let owner_addr = owner();
    set_taxonomy(&client, &a, &[(&owner_addr, "basket-b", dec!(1))], None).await;
    set_taxonomy(&client, &b, &[(&owner_addr, "basket-a", dec!(1))], None).await;

    let err = client
        .call(
            &a,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CircularTaxonomy(_)));
}

#[tokio::test]
async fn dropped_datasets_are_gone() {
    let ledger = Arc::new(MockLedger::new());
    let client = client(owner(), &ledger);

    let ds_ref = deploy_stream(&client, "prices", procedures::primitive_template()).await;
    insert_records(&client, &ds_ref, &[("2021-01-01", "1")]).await;

    let tx = client.drop_dataset("prices").await.unwrap();
    confirm_ok(&client, &tx).await;

    let err = client
        .call(
            &ds_ref,
            procedures::GET_RECORD,
            vec![Arg::Null, Arg::Null, Arg::Null],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DatasetNotFound(_)));

    // the name is reusable after a drop
    let tx = client
        .deploy_dataset("prices", procedures::primitive_template())
        .await
        .unwrap();
    confirm_ok(&client, &tx).await;
}
