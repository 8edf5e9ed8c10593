//! Universal invariants every encodable shape must satisfy, checked against randomly
//! generated values instead of fixed fixtures.

use dynssz::{Codec, SpecValues};
use dynssz_derive::SszReflect;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct Account {
    nonce: u64,
    balance: u64,
    #[dynssz(size = "?", max = "32")]
    code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct Padded {
    #[dynssz(size = "10")]
    bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct WithDynVector {
    #[dynssz(size = "4", dyn_size = "SLOTS_PER_EPOCH")]
    slots: Vec<u8>,
    tag: u8,
}

/// A container whose second dynamic field is itself a list of lists, so its body carries its
/// own nested offset table rather than a top-level one at position 0.
#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct Ledger {
    #[dynssz(size = "?", max = "16")]
    label: Vec<u8>,
    #[dynssz(max = "8,4")]
    entries: Vec<Vec<u8>>,
}

fn arb_account() -> impl Strategy<Value = Account> {
    (
        any::<u64>(),
        any::<u64>(),
        prop::collection::vec(any::<u8>(), 0..=32),
    )
        .prop_map(|(nonce, balance, code)| Account {
            nonce,
            balance,
            code,
        })
}

fn arb_ledger() -> impl Strategy<Value = Ledger> {
    (
        prop::collection::vec(any::<u8>(), 0..=16),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..=4), 0..=8),
    )
        .prop_map(|(label, entries)| Ledger { label, entries })
}

proptest! {
    /// Invariant 1 + 2: `unmarshal(marshal(v)) == v` and `len(marshal(v)) == size(v)`.
    #[test]
    fn round_trip_and_size_agree(value in arb_account()) {
        let codec = Codec::new(SpecValues::empty());
        let bytes = codec.marshal(&value).unwrap();
        prop_assert_eq!(bytes.len() as u64, codec.size(&value).unwrap());
        let decoded: Account = codec.unmarshal(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Invariant 6: `marshal_into` produces exactly the bytes `marshal` does.
    #[test]
    fn streaming_matches_buffered(value in arb_account()) {
        let codec = Codec::new(SpecValues::empty());
        let mut streamed = Vec::new();
        codec.marshal_into(&value, &mut streamed).unwrap();
        prop_assert_eq!(streamed, codec.marshal(&value).unwrap());
    }

    /// Invariant 1 + 2, against a value with a *nested* dynamic region: `entries`'s own body
    /// carries an offset table that does not start at position 0, exercising the
    /// region-relative offset patching a top-level-only value never touches.
    #[test]
    fn round_trip_and_size_agree_across_nested_offset_tables(value in arb_ledger()) {
        let codec = Codec::new(SpecValues::empty());
        let bytes = codec.marshal(&value).unwrap();
        prop_assert_eq!(bytes.len() as u64, codec.size(&value).unwrap());
        let decoded: Ledger = codec.unmarshal(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Invariant 6, same nested-offset-table value: the streaming encoder must agree with the
    /// buffered one on where a nested region's offsets are patched, not just a top-level one's.
    #[test]
    fn streaming_matches_buffered_across_nested_offset_tables(value in arb_ledger()) {
        let codec = Codec::new(SpecValues::empty());
        let mut streamed = Vec::new();
        codec.marshal_into(&value, &mut streamed).unwrap();
        prop_assert_eq!(streamed, codec.marshal(&value).unwrap());
    }

    /// Invariant 5: a vector under `ssz-size:N` with `k<N` actual elements has the same root
    /// as the explicitly zero-padded value.
    #[test]
    fn root_is_stable_under_zero_padding(k in 0usize..=10) {
        let codec = Codec::new(SpecValues::empty());
        let short = Padded { bytes: vec![7u8; k] };
        let mut padded_bytes = vec![7u8; k];
        padded_bytes.resize(10, 0);
        let padded = Padded { bytes: padded_bytes };

        prop_assert_eq!(
            codec.hash_tree_root(&short).unwrap(),
            codec.hash_tree_root(&padded).unwrap(),
        );
    }

    /// Invariant 7: a spec value no field references leaves roots and bytes unchanged;
    /// changing the one a field does reference only changes the region it governs.
    #[test]
    fn unreferenced_spec_value_has_no_effect(
        slots in prop::collection::vec(any::<u8>(), 1..=4),
        tag in any::<u8>(),
        unrelated in any::<u64>(),
    ) {
        let value = WithDynVector { slots, tag };
        let baseline = Codec::new(SpecValues::empty());
        let with_unrelated = Codec::new(SpecValues::from_iter([
            ("SOME_OTHER_CONSTANT".to_string(), unrelated),
        ]));

        prop_assert_eq!(
            baseline.marshal(&value).unwrap(),
            with_unrelated.marshal(&value).unwrap(),
        );
        prop_assert_eq!(
            baseline.hash_tree_root(&value).unwrap(),
            with_unrelated.hash_tree_root(&value).unwrap(),
        );
    }

    /// Invariant 7, other half: referencing `SLOTS_PER_EPOCH` changes the encoded length to
    /// match the resolved vector length, while leaving the static `tag` field's own bytes
    /// (beyond shifting position) untouched.
    #[test]
    fn referenced_spec_value_resizes_the_vector_it_governs(
        epoch_len in 1u64..=16,
        tag in any::<u8>(),
    ) {
        let slots: Vec<u8> = (0..epoch_len as usize).map(|i| i as u8).collect();
        let value = WithDynVector { slots, tag };
        let codec = Codec::new(SpecValues::from_iter([
            ("SLOTS_PER_EPOCH".to_string(), epoch_len),
        ]));

        let bytes = codec.marshal(&value).unwrap();
        prop_assert_eq!(bytes.len() as u64, epoch_len + 1);
        prop_assert_eq!(bytes[bytes.len() - 1], tag);
    }
}
