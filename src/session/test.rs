use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Timestamp},
    session::{ClientSession, TransactionState},
};

#[test]
fn transaction_lifecycle() {
    let mut session = ClientSession::new(doc! { "id": 1 });
    assert!(!session.in_transaction());

    session.start_transaction();
    assert!(session.in_transaction());

    session.mark_transaction_in_progress();
    assert_eq!(session.transaction_state(), &TransactionState::InProgress);
    assert!(session.in_transaction());

    session.commit_transaction();
    assert_eq!(
        session.transaction_state(),
        &TransactionState::Committed {
            data_committed: true
        }
    );
    assert!(!session.in_transaction());

    session.reset_transaction();
    assert_eq!(session.transaction_state(), &TransactionState::None);
}

#[test]
fn transaction_numbers_increase() {
    let mut session = ClientSession::new(doc! { "id": 1 });
    assert_eq!(session.txn_number(), 0);
    assert_eq!(session.advance_transaction_number(), 1);
    assert_eq!(session.advance_transaction_number(), 2);
    assert_eq!(session.txn_number(), 2);
}

#[test]
fn operation_time_only_moves_forward() {
    let mut session = ClientSession::without_id();
    assert!(session.id().is_none());

    let early = Timestamp {
        time: 10,
        increment: 1,
    };
    let late = Timestamp {
        time: 20,
        increment: 0,
    };
    session.advance_operation_time(late);
    session.advance_operation_time(early);
    assert_eq!(session.operation_time(), Some(late));

    session.set_snapshot_time(early);
    session.set_snapshot_time(late);
    assert_eq!(session.snapshot_time(), Some(early));
}
