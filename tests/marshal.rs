//! Integration tests over the public Object Reader surface, covering
//! end-to-end decode scenarios for the marshal wire format.

use rails_marshal_session::{Document, ReaderErrorKind, ValueType};

#[test]
fn nil_scenario() {
    let doc = Document::parse(&[4, 8, 0x30]).unwrap();
    let root = doc.root();
    assert_eq!(root.value_type(), ValueType::Nil);
    assert!(root.as_array().is_err());
}

#[test]
fn version_prefix_is_exposed() {
    let doc = Document::parse(&[4, 8, 0x30]).unwrap();
    assert_eq!(doc.major_version(), 4);
    assert_eq!(doc.minor_version(), 8);
}

#[test]
fn nested_array_of_strings_with_a_shared_reference() {
    // ["x", :ivar_wrapped_same_string_again_by_reference]
    let bytes = [
        4, 8, b'[', 7, b'I', b'"', 6, b'x', 6, b':', 6, b'E', b'T', b'@', 6,
    ];
    let doc = Document::parse(&bytes).unwrap();
    let items = doc.root().as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.value_type(), ValueType::String);
        assert_eq!(item.as_string().unwrap(), "x");
    }
}

#[test]
fn map_navigation_round_trip() {
    // { "session_id" => "abc", "count" => 3 }
    let mut bytes = vec![4, 8, b'{', 7]; // 2 pairs
    bytes.extend_from_slice(&[b':', 15]); // symbol length 10
    bytes.extend_from_slice(b"session_id");
    bytes.extend_from_slice(&[b'"', 8]); // string length 3
    bytes.extend_from_slice(b"abc");
    bytes.extend_from_slice(&[b':', 10]); // symbol length 5
    bytes.extend_from_slice(b"count");
    bytes.extend_from_slice(&[b'i', 8]); // integer 3

    let doc = Document::parse(&bytes).unwrap();
    let map = doc.root().as_map().unwrap();
    assert_eq!(map.get("session_id").unwrap().as_string().unwrap(), "abc");
    assert_eq!(map.get("count").unwrap().as_integer().unwrap(), 3);
    assert!(map.get("missing").is_none());
}

#[test]
fn unsupported_tag_inside_map_value_fails_the_whole_map() {
    let bytes = [4, 8, b'{', 6, b'i', 6, 0xFFu8];
    let err = Document::parse(&bytes).unwrap_err();
    assert!(matches!(err.kind, ReaderErrorKind::UnsupportedType(0xFF)));
}

#[test]
fn cyclic_array_is_representable_via_self_reference() {
    // arr = []; arr << arr  -- the array references itself at index 0.
    let bytes = [4, 8, b'[', 6, b'@', 0];
    let doc = Document::parse(&bytes).unwrap();
    let items = doc.root().as_array().unwrap();
    assert_eq!(items.len(), 1);
    let looped = items[0].as_array().unwrap();
    assert_eq!(looped.len(), 1);
}
