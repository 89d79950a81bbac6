//! Tests for entity payload codecs
//!
//! These tests verify:
//! - JSON and bincode round-trips for representative values
//! - JSON payloads are UTF-8 text
//! - Malformed payloads fail with a decode error
//! - Absent payloads decode to None

use std::collections::BTreeMap;

use entitykv::codec::{BincodeCodec, Codec, JsonCodec};
use entitykv::EntityKvError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: u64,
    customer: String,
    lines: Vec<OrderLine>,
    note: Option<String>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderLine {
    sku: String,
    quantity: u32,
    unit_price_cents: i64,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_order() -> Order {
    let mut tags = BTreeMap::new();
    tags.insert("channel".to_string(), "web".to_string());
    tags.insert("region".to_string(), "eu-west".to_string());

    Order {
        id: 42,
        customer: "Zoë \"quoted\" \u{1F600}".to_string(),
        lines: vec![
            OrderLine {
                sku: "A-1".to_string(),
                quantity: 3,
                unit_price_cents: 1999,
            },
            OrderLine {
                sku: "B-2".to_string(),
                quantity: 1,
                unit_price_cents: -500,
            },
        ],
        note: None,
        tags,
    }
}

// =============================================================================
// JSON Codec Tests
// =============================================================================

#[test]
fn test_json_round_trip() {
    let codec = JsonCodec;
    let order = sample_order();

    let bytes = codec.encode(&order).unwrap();
    let decoded: Order = codec.decode(&bytes).unwrap();

    assert_eq!(decoded, order);
}

#[test]
fn test_json_payload_is_utf8_text() {
    let codec = JsonCodec;
    let bytes = codec.encode(&sample_order()).unwrap();

    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.starts_with('{'));
    assert!(text.contains("\"customer\""));
    assert!(text.contains("\"sku\":\"A-1\""));
}

#[test]
fn test_json_round_trip_primitives() {
    let codec = JsonCodec;

    let n: i64 = codec.decode(&codec.encode(&-17i64).unwrap()).unwrap();
    assert_eq!(n, -17);

    let s: String = codec.decode(&codec.encode(&String::new()).unwrap()).unwrap();
    assert_eq!(s, "");

    let v: Vec<Option<u8>> = codec
        .decode(&codec.encode(&vec![Some(1u8), None]).unwrap())
        .unwrap();
    assert_eq!(v, vec![Some(1), None]);
}

#[test]
fn test_json_decode_malformed_fails() {
    let codec = JsonCodec;

    let result: Result<Order, _> = codec.decode(b"{\"id\": 42, \"customer\"");
    assert!(matches!(result, Err(EntityKvError::Decode(_))));
}

#[test]
fn test_json_decode_wrong_shape_fails() {
    let codec = JsonCodec;

    let result: Result<Order, _> = codec.decode(b"[1, 2, 3]");
    assert!(matches!(result, Err(EntityKvError::Decode(_))));
}

#[test]
fn test_json_decode_invalid_utf8_fails() {
    let codec = JsonCodec;

    let result: Result<String, _> = codec.decode(&[0x22, 0xff, 0xfe, 0x22]);
    assert!(matches!(result, Err(EntityKvError::Decode(_))));
}

#[test]
fn test_decode_optional_absent_is_none() {
    let codec = JsonCodec;

    let decoded: Option<Order> = codec.decode_optional(None).unwrap();
    assert!(decoded.is_none());
}

#[test]
fn test_decode_optional_present() {
    let codec = JsonCodec;
    let order = sample_order();
    let bytes = codec.encode(&order).unwrap();

    let decoded: Option<Order> = codec.decode_optional(Some(&bytes)).unwrap();
    assert_eq!(decoded, Some(order));
}

// =============================================================================
// Bincode Codec Tests
// =============================================================================

#[test]
fn test_bincode_round_trip() {
    let codec = BincodeCodec;
    let order = sample_order();

    let bytes = codec.encode(&order).unwrap();
    let decoded: Order = codec.decode(&bytes).unwrap();

    assert_eq!(decoded, order);
}

#[test]
fn test_bincode_is_smaller_than_json() {
    let order = sample_order();

    let json = JsonCodec.encode(&order).unwrap();
    let binary = BincodeCodec.encode(&order).unwrap();

    assert!(binary.len() < json.len());
}

#[test]
fn test_bincode_decode_truncated_fails() {
    let codec = BincodeCodec;
    let bytes = codec.encode(&sample_order()).unwrap();

    let result: Result<Order, _> = codec.decode(&bytes[..bytes.len() / 2]);
    assert!(matches!(result, Err(EntityKvError::Decode(_))));
}
