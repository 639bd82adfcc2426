//! Property-based tests (fuzzing) for the remote codec and key derivation.
//!
//! Uses proptest to generate random/malformed inputs and verify the codec
//! never panics, only returns clean serialization errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use memo_engine::remote::ShapeCodec;
use memo_engine::{CacheArgs, RemoteError};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (including structures no shape accepts)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map("[a-z0-9]{0,6}", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn assert_clean<T: std::fmt::Debug>(result: Result<T, RemoteError>) {
    if let Err(e) = result {
        assert!(matches!(e, RemoteError::Serialization { .. }), "unexpected error: {e:?}");
        assert!(!e.is_connection_class());
    }
}

// =============================================================================
// Decode never panics
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn fuzz_decode_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        assert_clean(ShapeCodec::<Vec<u32>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<Option<String>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<BTreeMap<u16, bool>>::new().decode(&bytes));
    }

    #[test]
    fn fuzz_decode_arbitrary_json(json in arbitrary_json_strategy()) {
        let bytes = serde_json::to_vec(&json).unwrap();
        assert_clean(ShapeCodec::<Vec<String>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<BTreeSet<i64>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<BTreeMap<String, Value>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<Option<u8>>::new().decode(&bytes));
        assert_clean(ShapeCodec::<Value>::new().decode(&bytes));
    }

    #[test]
    fn fuzz_truncated_payload(values in prop::collection::vec(any::<i32>(), 1..64), cut in 1usize..64) {
        let codec = ShapeCodec::<Vec<i32>>::new();
        let bytes = codec.encode(&values).unwrap();
        let cut = cut.min(bytes.len() - 1);
        prop_assert!(codec.decode(&bytes[..cut]).is_err());
    }
}

// =============================================================================
// Shape checks
// =============================================================================

proptest! {
    #[test]
    fn prop_lists_never_decode_as_maps(values in prop::collection::vec(any::<u16>(), 0..32)) {
        let bytes = ShapeCodec::<Vec<u16>>::new().encode(&values).unwrap();
        prop_assert!(ShapeCodec::<BTreeMap<u16, u16>>::new().decode(&bytes).is_err());
    }

    #[test]
    fn prop_map_keys_keep_their_type(map in prop::collection::btree_map(any::<u32>(), ".{0,12}", 0..16)) {
        let codec = ShapeCodec::<BTreeMap<u32, String>>::new();
        let back = codec.decode(&codec.encode(&map).unwrap()).unwrap();
        prop_assert_eq!(back, map);
    }

    #[test]
    fn prop_present_optional_survives(value in any::<i64>()) {
        let codec = ShapeCodec::<Option<i64>>::new();
        let back = codec.decode(&codec.encode(&Some(value)).unwrap()).unwrap();
        prop_assert_eq!(back, Some(value));
    }
}

// =============================================================================
// Key derivation
// =============================================================================

proptest! {
    #[test]
    fn prop_keys_are_deterministic(a in any::<u64>(), b in ".*") {
        prop_assert_eq!((a, b.clone()).cache_key(), (a, b).cache_key());
    }

    #[test]
    fn prop_distinct_arguments_give_distinct_keys(a in any::<u32>(), b in any::<u32>()) {
        prop_assume!(a != b);
        prop_assert_ne!(a.cache_key(), b.cache_key());
        prop_assert_ne!((a, b).cache_key(), (b, a).cache_key());
    }

    #[test]
    fn prop_string_keys_do_not_collide_with_tuples(s in "[a-z,]{0,12}") {
        // "a,b" as one string must not look like two arguments
        let parts: Vec<String> = s.split(',').map(str::to_string).collect();
        if parts.len() == 2 {
            let tuple = (parts[0].clone(), parts[1].clone());
            prop_assert_ne!(s.cache_key(), tuple.cache_key());
        }
    }
}
