use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::{
    bson::{doc, Bson},
    concern::WriteConcern,
    error::{BulkWriteOperationError, Error, ErrorKind, Result, ServerErrorCategory},
    operation::{
        BulkMixedWriteOperation,
        DeleteLimit,
        DeleteRequest,
        InsertRequest,
        UpdateRequest,
        WriteRequest,
    },
    options::{BulkWriteOptions, Hint, RetrySettings},
    results::BulkWriteOperationResult,
    session::ClientSession,
    test::{lsid, MockBinding},
    Namespace,
};

fn ns() -> Namespace {
    Namespace::new("db", "coll")
}

fn insert(i: i32) -> WriteRequest {
    InsertRequest::new(doc! { "_id": i, "x": i }).into()
}

fn update(i: i32) -> WriteRequest {
    UpdateRequest::builder()
        .filter(doc! { "_id": i })
        .update(doc! { "$inc": { "x": 1 } })
        .build()
        .into()
}

fn delete(i: i32) -> WriteRequest {
    DeleteRequest::builder()
        .filter(doc! { "_id": i })
        .build()
        .into()
}

fn ordered(ordered: bool) -> BulkWriteOptions {
    BulkWriteOptions::builder().ordered(ordered).build()
}

async fn run(
    binding: &MockBinding,
    requests: Vec<WriteRequest>,
    options: BulkWriteOptions,
) -> Result<BulkWriteOperationResult> {
    let mut session = ClientSession::new(lsid());
    BulkMixedWriteOperation::new(ns(), requests, options)
        .execute(
            binding,
            &mut session,
            RetrySettings::default(),
            CancellationToken::new(),
        )
        .await
}

fn bulk_write_failure(error: Error) -> BulkWriteOperationError {
    match *error.kind {
        ErrorKind::BulkWrite(failure) => failure,
        other => panic!("expected a bulk write error, got {other:?}"),
    }
}

/// The `_id` filters of each command's statements, in the order the commands were sent.
fn sent_ids(binding: &MockBinding) -> Vec<(String, Vec<i32>)> {
    binding
        .commands()
        .into_iter()
        .map(|command| {
            let statements = &command.document_sequences[0].documents;
            let ids = statements
                .iter()
                .map(|statement| match statement.get_document("q") {
                    Ok(filter) => filter.get_i32("_id").unwrap(),
                    Err(_) => statement.get_i32("_id").unwrap(),
                })
                .collect();
            (command.name, ids)
        })
        .collect()
}

#[tokio::test]
async fn ordered_batches_split_where_the_type_changes() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 2 });
    binding.push_reply(doc! { "ok": 1, "n": 1, "nModified": 1 });
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let requests = vec![insert(0), insert(1), update(2), delete(3), insert(4)];

    let result = run(&binding, requests.clone(), ordered(true)).await.unwrap();

    assert_eq!(
        sent_ids(&binding),
        vec![
            ("insert".to_string(), vec![0, 1]),
            ("update".to_string(), vec![2]),
            ("delete".to_string(), vec![3]),
            ("insert".to_string(), vec![4]),
        ]
    );
    assert_eq!(
        result,
        BulkWriteOperationResult::Acknowledged {
            request_count: 5,
            processed_requests: requests,
            inserted_count: 3,
            matched_count: 1,
            deleted_count: 1,
            modified_count: Some(1),
            upserts: vec![],
        }
    );
}

#[tokio::test]
async fn unordered_batches_group_every_request_of_a_type() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "ok": 1,
        "n": 1,
        "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
    });
    binding.push_reply(doc! { "ok": 1, "n": 2, "nModified": 2 });
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let requests = vec![insert(0), update(1), insert(2), delete(3), update(4)];

    let error = run(&binding, requests.clone(), ordered(false))
        .await
        .unwrap_err();

    assert_eq!(
        sent_ids(&binding),
        vec![
            ("insert".to_string(), vec![0, 2]),
            ("update".to_string(), vec![1, 4]),
            ("delete".to_string(), vec![3]),
        ]
    );
    let failure = bulk_write_failure(error);
    assert_eq!(failure.failed_indexes(), vec![2]);
    assert_eq!(
        failure.write_errors[0].category,
        ServerErrorCategory::DuplicateKey
    );
    assert_eq!(failure.result.processed_requests(), &requests[..]);
    assert_eq!(failure.result.inserted_count(), Some(1));
    assert_eq!(failure.result.matched_count(), Some(2));
    assert_eq!(failure.result.deleted_count(), Some(1));
    assert!(failure.unprocessed_requests.is_empty());
}

#[tokio::test]
async fn unordered_write_continues_after_a_failed_batch() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    binding.push_reply(doc! {
        "ok": 1,
        "n": 0,
        "nModified": 0,
        "writeErrors": [{ "index": 0, "code": 2, "codeName": "BadValue", "errmsg": "bad update" }],
    });
    binding.push_reply(doc! { "ok": 1, "n": 1 });

    let error = run(&binding, vec![insert(0), update(1), delete(2)], ordered(false))
        .await
        .unwrap_err();

    assert_eq!(
        binding.command_names(),
        vec!["insert".to_string(), "update".to_string(), "delete".to_string()]
    );
    let failure = bulk_write_failure(error);
    assert_eq!(failure.write_errors.len(), 1);
    assert_eq!(failure.write_errors[0].index, 1);
    assert_eq!(failure.write_errors[0].code_name.as_deref(), Some("BadValue"));
    assert_eq!(
        failure.write_errors[0].category,
        ServerErrorCategory::Uncategorized
    );
    assert_eq!(failure.result.inserted_count(), Some(1));
    assert_eq!(failure.result.deleted_count(), Some(1));
    assert_eq!(failure.result.processed_requests().len(), 3);
}

#[tokio::test]
async fn ordered_write_stops_at_the_first_write_error() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "ok": 1,
        "n": 1,
        "writeErrors": [{ "index": 1, "code": 11000, "errmsg": "duplicate key" }],
    });
    let requests = vec![insert(0), insert(1), insert(2), update(3)];

    let error = run(&binding, requests.clone(), ordered(true))
        .await
        .unwrap_err();

    assert_eq!(binding.command_names(), vec!["insert".to_string()]);
    let failure = bulk_write_failure(error);
    assert_eq!(failure.failed_indexes(), vec![1]);
    assert_eq!(failure.result.processed_requests(), &requests[..2]);
    assert_eq!(failure.unprocessed_requests, requests[2..].to_vec());
    assert_eq!(failure.result.request_count(), 4);
}

#[tokio::test]
async fn upserts_report_original_indexes() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    binding.push_reply(doc! {
        "ok": 1,
        "n": 2,
        "nModified": 1,
        "upserted": [{ "index": 1, "_id": 7 }],
    });

    let result = run(&binding, vec![delete(0), update(1), update(2)], ordered(true))
        .await
        .unwrap();

    assert_eq!(result.matched_count(), Some(1));
    assert_eq!(result.modified_count(), Some(1));
    assert_eq!(result.upserts().len(), 1);
    assert_eq!(result.upserts()[0].index, 2);
    assert_eq!(result.upserts()[0].id, Bson::Int32(7));
}

#[tokio::test]
async fn large_batches_are_split_into_several_commands() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 2 });
    binding.push_reply(doc! { "ok": 1, "n": 2 });
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let options = BulkWriteOptions::builder().max_batch_count(2).build();

    let result = run(&binding, (0..5).map(insert).collect(), options)
        .await
        .unwrap();

    assert_eq!(
        sent_ids(&binding),
        vec![
            ("insert".to_string(), vec![0, 1]),
            ("insert".to_string(), vec![2, 3]),
            ("insert".to_string(), vec![4]),
        ]
    );
    assert_eq!(result.inserted_count(), Some(5));
}

#[tokio::test]
async fn unacknowledged_ordered_write_waits_for_earlier_batches() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let options = BulkWriteOptions::builder()
        .write_concern(WriteConcern::unacknowledged())
        .build();

    let result = run(&binding, vec![insert(0), delete(1)], options)
        .await
        .unwrap();

    let commands = binding.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0].body.get_document("writeConcern").unwrap(),
        &doc! { "w": 1 }
    );
    assert_eq!(
        commands[1].body.get_document("writeConcern").unwrap(),
        &doc! { "w": 0 }
    );
    assert_eq!(binding.remaining_replies(), 0);
    assert!(!result.is_acknowledged());
    assert_eq!(result.processed_requests().len(), 2);
}

#[tokio::test]
async fn hint_with_unacknowledged_write_concern_is_rejected() {
    let binding = MockBinding::new();
    let hinted: WriteRequest = DeleteRequest::builder()
        .filter(doc! {})
        .hint(Hint::Name("x_1".to_string()))
        .build()
        .into();
    let options = BulkWriteOptions::builder()
        .write_concern(WriteConcern::unacknowledged())
        .build();

    let error = run(&binding, vec![insert(0), hinted], options)
        .await
        .unwrap_err();

    assert!(error.is_invalid_argument());
    assert!(binding.selections().is_empty());
}

#[tokio::test]
async fn empty_bulk_write_is_rejected() {
    let binding = MockBinding::new();
    let error = run(&binding, vec![], BulkWriteOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_invalid_argument());
    assert!(binding.selections().is_empty());
}

#[tokio::test]
async fn update_without_operators_is_rejected() {
    let binding = MockBinding::new();
    let request: WriteRequest = UpdateRequest::builder()
        .filter(doc! {})
        .update(doc! { "x": 1 })
        .build()
        .into();

    let error = run(&binding, vec![request], BulkWriteOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_invalid_argument());
}

#[tokio::test]
async fn single_document_writes_are_retried() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_reply(doc! { "ok": 1, "n": 2 });

    let result = run(&binding, vec![insert(0), insert(1)], ordered(true))
        .await
        .unwrap();

    assert_eq!(result.inserted_count(), Some(2));
    let commands = binding.commands();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0].body.get_i64("txnNumber").unwrap(), 1);
    assert_eq!(commands[1].body.get_i64("txnNumber").unwrap(), 1);
    assert_eq!(
        commands[0].document_sequences,
        commands[1].document_sequences
    );
    let targets = binding.command_targets();
    assert_ne!(targets[0], targets[1]);
}

#[tokio::test]
async fn multi_document_writes_are_not_retried() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    let delete_many: WriteRequest = DeleteRequest::builder()
        .filter(doc! { "x": { "$gt": 1 } })
        .limit(DeleteLimit::Many)
        .build()
        .into();

    let error = run(&binding, vec![delete_many], ordered(true))
        .await
        .unwrap_err();

    assert!(error.is_network_error());
    let commands = binding.commands();
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].body.contains_key("txnNumber"));
}

#[tokio::test]
async fn write_concern_error_is_reported_with_the_result() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "ok": 1,
        "n": 1,
        "writeConcernError": { "code": 64, "codeName": "WriteConcernFailed", "errmsg": "waiting for replication timed out" },
    });

    let error = run(&binding, vec![insert(0)], ordered(true))
        .await
        .unwrap_err();

    assert_eq!(binding.commands().len(), 1);
    let failure = bulk_write_failure(error);
    assert!(failure.write_errors.is_empty());
    assert_eq!(failure.write_concern_error.map(|e| e.code), Some(64));
    assert_eq!(failure.result.inserted_count(), Some(1));
}

#[tokio::test]
async fn statements_and_command_options() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 0, "nModified": 0 });
    binding.push_reply(doc! { "ok": 1, "n": 0 });
    let update_many: WriteRequest = UpdateRequest::builder()
        .filter(doc! { "x": 1 })
        .update(vec![doc! { "$set": { "y": "$$v" } }])
        .multi(true)
        .upsert(true)
        .hint(Hint::Name("x_1".to_string()))
        .build()
        .into();
    let delete_many: WriteRequest = DeleteRequest::builder()
        .filter(doc! { "x": 2 })
        .limit(DeleteLimit::Many)
        .build()
        .into();
    let options = BulkWriteOptions::builder()
        .ordered(false)
        .let_vars(doc! { "v": 1 })
        .bypass_document_validation(true)
        .build();

    run(&binding, vec![update_many, delete_many], options)
        .await
        .unwrap();

    let commands = binding.commands();
    assert_eq!(
        commands[0].body,
        doc! {
            "update": "coll",
            "ordered": false,
            "bypassDocumentValidation": true,
            "let": { "v": 1 },
            "lsid": lsid(),
        }
    );
    assert_eq!(
        commands[0].document_sequence("updates").unwrap(),
        &[doc! {
            "q": { "x": 1 },
            "u": [{ "$set": { "y": "$$v" } }],
            "multi": true,
            "upsert": true,
            "hint": "x_1",
        }][..]
    );
    assert_eq!(
        commands[1].body,
        doc! { "delete": "coll", "ordered": false, "let": { "v": 1 }, "lsid": lsid() }
    );
    assert_eq!(
        commands[1].document_sequence("deletes").unwrap(),
        &[doc! { "q": { "x": 2 }, "limit": 0 }][..]
    );
}

#[test]
fn inserts_get_an_id_up_front() {
    let request = InsertRequest::new(doc! { "x": 1 });
    let keys: Vec<&String> = request.document.keys().collect();
    assert_eq!(keys, vec!["_id", "x"]);
    assert!(matches!(request.id(), Some(Bson::ObjectId(_))));

    let request = InsertRequest::new(doc! { "x": 1, "_id": 5 });
    assert_eq!(request.document, doc! { "x": 1, "_id": 5 });
}

