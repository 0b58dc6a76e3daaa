use pretty_assertions::assert_eq;

use crate::{
    bson::doc,
    trace::{serialize_command_or_reply, truncate_on_char_boundary},
};

#[test]
fn tracing_truncation() {
    let two_emoji = String::from("🤔🤔");

    let mut s = two_emoji.clone();
    assert_eq!(s.len(), 8);

    truncate_on_char_boundary(&mut s, 0);
    assert_eq!(s, String::from("..."));

    // rounds up to the end of the first emoji
    s.clone_from(&two_emoji);
    truncate_on_char_boundary(&mut s, 1);
    assert_eq!(s, String::from("🤔..."));

    s.clone_from(&two_emoji);
    truncate_on_char_boundary(&mut s, 4);
    assert_eq!(s, String::from("🤔..."));

    s.clone_from(&two_emoji);
    truncate_on_char_boundary(&mut s, 5);
    assert_eq!(s, two_emoji);

    s.clone_from(&two_emoji);
    truncate_on_char_boundary(&mut s, 10);
    assert_eq!(s, two_emoji);
}

#[test]
fn command_truncation() {
    let command = doc! { "getMore": 12_i64, "collection": "coll" };
    let full = serialize_command_or_reply(&command, 1000);
    assert!(full.contains("getMore"));
    assert!(full.contains("coll"));

    let short = serialize_command_or_reply(&command, 5);
    assert!(short.ends_with("..."));
    assert_eq!(short.len(), 8);
}
