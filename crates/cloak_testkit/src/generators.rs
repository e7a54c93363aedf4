//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data that maintains the
//! row store's invariants.

use cloak_core::Row;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for opaque log payloads.
pub fn blob_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for valid field names (never `id`).
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be id", |s| s != "id")
}

/// Strategy for field values.
pub fn field_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,24}").expect("Invalid regex")
}

/// Strategy for a field map with up to `max` fields.
pub fn fields_strategy(max: usize) -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..=max)
}

/// Strategy for rows with random UUID ids.
pub fn row_strategy() -> impl Strategy<Value = Row> {
    (prop::array::uniform16(any::<u8>()), fields_strategy(6))
        .prop_map(|(bytes, fields)| {
            let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
            Row::new(id.to_string(), fields)
        })
}
