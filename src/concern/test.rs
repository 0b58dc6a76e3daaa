use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Document},
    concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern},
};

#[test]
fn write_concern_is_acknowledged() {
    let w_1 = WriteConcern::builder().w(1).journal(false).build();
    assert!(w_1.is_acknowledged());

    let w_majority = WriteConcern::builder().w(Acknowledgment::Majority).build();
    assert!(w_majority.is_acknowledged());

    assert!(!WriteConcern::unacknowledged().is_acknowledged());

    let w_0_journaled = WriteConcern::builder().w(0).journal(true).build();
    assert!(w_0_journaled.is_acknowledged());

    assert!(WriteConcern::default().is_acknowledged());
}

#[test]
fn write_concern_validate() {
    assert!(WriteConcern::w1().validate().is_ok());

    let negative = WriteConcern::builder().w(-1).build();
    assert!(negative.validate().unwrap_err().is_invalid_argument());

    let w_0_journaled = WriteConcern::builder().w(0).journal(true).build();
    assert!(w_0_journaled.validate().is_err());
}

#[test]
fn write_concern_serialization() {
    let wc = WriteConcern::builder()
        .w("majority")
        .w_timeout(Duration::from_millis(150))
        .journal(true)
        .build();
    let document = crate::bson::to_document(&wc).unwrap();
    assert_eq!(document, doc! { "w": "majority", "wtimeout": 150, "j": true });

    let empty = crate::bson::to_document(&WriteConcern::default()).unwrap();
    assert_eq!(empty, Document::new());
    assert!(WriteConcern::default().is_empty());

    let tagged: WriteConcern = crate::bson::from_document(doc! { "w": "dc1", "wtimeout": 10 }).unwrap();
    assert_eq!(tagged.w, Some(Acknowledgment::Custom("dc1".to_string())));
    assert_eq!(tagged.w_timeout, Some(Duration::from_millis(10)));
}

#[test]
fn read_concern_levels() {
    let rc: ReadConcern = crate::bson::from_document(doc! { "level": "snapshot" }).unwrap();
    assert_eq!(rc, ReadConcern::snapshot());

    let custom: ReadConcern = crate::bson::from_document(doc! { "level": "future" }).unwrap();
    assert_eq!(custom.level, ReadConcernLevel::Custom("future".to_string()));
    assert_eq!(
        crate::bson::to_document(&ReadConcern::majority()).unwrap(),
        doc! { "level": "majority" }
    );
}
