use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::{
    bson::{doc, Document, Timestamp},
    error::Error,
    operation::{AggregateOperation, AggregateTarget},
    options::{AggregateOptions, RetrySettings},
    session::ClientSession,
    test::{lsid, numbered_docs, MockBinding},
    Namespace,
};

fn ns() -> Namespace {
    Namespace::new("db", "coll")
}

fn cursor_reply(id: i64, first_batch: Vec<Document>) -> Document {
    doc! {
        "cursor": { "id": id, "ns": "db.coll", "firstBatch": first_batch },
        "ok": 1,
    }
}

#[tokio::test]
async fn builds_aggregate_command() {
    let binding = MockBinding::new();
    binding.push_reply(cursor_reply(0, numbered_docs(0, 2)));
    let options = AggregateOptions::builder()
        .batch_size(2)
        .allow_disk_use(true)
        .build();
    let mut operation = AggregateOperation::<Document>::new(
        ns(),
        vec![doc! { "$match": { "x": { "$gte": 0 } } }],
        options,
    );
    let mut session = ClientSession::new(lsid());

    let mut cursor = operation
        .execute(
            &binding,
            &mut session,
            RetrySettings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let commands = binding.commands();
    assert_eq!(commands[0].target_db, "db");
    assert_eq!(
        commands[0].body,
        doc! {
            "aggregate": "coll",
            "pipeline": [{ "$match": { "x": { "$gte": 0 } } }],
            "cursor": { "batchSize": 2 },
            "allowDiskUse": true,
            "lsid": lsid(),
        }
    );

    assert!(cursor.move_next().await.unwrap());
    assert_eq!(cursor.current().unwrap(), &numbered_docs(0, 2)[..]);
    assert!(!cursor.move_next().await.unwrap());
}

#[tokio::test]
async fn database_aggregate_targets_one() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "cursor": { "id": 0_i64, "ns": "admin.$cmd.aggregate", "firstBatch": [] },
        "ok": 1,
    });
    let mut operation = AggregateOperation::<Document>::new(
        AggregateTarget::Database("admin".to_string()),
        vec![doc! { "$currentOp": {} }],
        None,
    );
    let mut session = ClientSession::new(lsid());

    let cursor = operation
        .execute(
            &binding,
            &mut session,
            RetrySettings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let commands = binding.commands();
    assert_eq!(commands[0].target_db, "admin");
    assert_eq!(commands[0].body.get_i32("aggregate").unwrap(), 1);
    assert_eq!(commands[0].body.get_document("cursor").unwrap(), &doc! {});
    assert!(cursor.was_first_batch_empty());
}

#[tokio::test]
async fn writing_stages_are_rejected_before_selection() {
    let binding = MockBinding::new();
    for stage in [doc! { "$out": "other" }, doc! { "$merge": { "into": "other" } }] {
        let mut operation =
            AggregateOperation::<Document>::new(ns(), vec![doc! { "$match": {} }, stage], None);
        let mut session = ClientSession::new(lsid());

        let error = operation
            .execute(
                &binding,
                &mut session,
                RetrySettings::default(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(error.is_invalid_argument());
    }
    assert!(binding.selections().is_empty());
}

#[tokio::test]
async fn retries_on_another_server_and_cursor_follows_it() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_reply(cursor_reply(7, numbered_docs(0, 1)));
    binding.push_reply(doc! {
        "cursor": { "id": 0_i64, "ns": "db.coll", "nextBatch": numbered_docs(1, 1) },
        "ok": 1,
    });
    let options = AggregateOptions::builder()
        .max_await_time(Duration::from_millis(100))
        .build();
    let mut operation = AggregateOperation::<Document>::new(ns(), vec![], options);
    let mut session = ClientSession::new(lsid());

    let mut cursor = operation
        .execute(
            &binding,
            &mut session,
            RetrySettings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    cursor.move_next().await.unwrap();
    cursor.move_next().await.unwrap();
    assert_eq!(cursor.current().unwrap(), &numbered_docs(1, 1)[..]);

    let targets = binding.command_targets();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[1], targets[2]);
    assert_ne!(targets[0], targets[1]);

    let get_more = &binding.commands()[2];
    assert_eq!(get_more.body.get_i64("getMore").unwrap(), 7);
    assert_eq!(get_more.body.get_i32("maxTimeMS").unwrap(), 100);
}

#[tokio::test]
async fn read_retry_disabled_by_settings() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    let mut operation = AggregateOperation::<Document>::new(ns(), vec![], None);
    let mut session = ClientSession::new(lsid());

    operation
        .execute(
            &binding,
            &mut session,
            RetrySettings::builder().retry_reads(false).build(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(binding.commands().len(), 1);
}

#[tokio::test]
async fn at_cluster_time_pins_snapshot_time() {
    let binding = MockBinding::new();
    let at_cluster_time = Timestamp {
        time: 10,
        increment: 1,
    };
    binding.push_reply(doc! {
        "cursor": {
            "id": 0_i64,
            "ns": "db.coll",
            "firstBatch": [],
            "atClusterTime": at_cluster_time,
        },
        "ok": 1,
    });
    let mut operation = AggregateOperation::<Document>::new(ns(), vec![], None);
    let mut session = ClientSession::new(lsid());

    operation
        .execute(
            &binding,
            &mut session,
            RetrySettings::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(session.snapshot_time(), Some(at_cluster_time));
}
