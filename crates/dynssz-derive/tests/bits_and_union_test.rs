use dynssz::bits::BitsValue;
use dynssz::{Codec, SpecValues};
use dynssz_derive::SszReflect;

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct WithBitvector {
    #[dynssz(size = "8")]
    flags: BitsValue,
    tag: u8,
}

#[test]
fn bitvector_field_round_trips() {
    let codec = Codec::new(SpecValues::empty());
    let value = WithBitvector {
        flags: BitsValue::from_bits([true, false, true, true, false, false, false, true]),
        tag: 1,
    };
    let bytes = codec.marshal(&value).unwrap();
    assert_eq!(bytes.len(), 2);
    let decoded: WithBitvector = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct WithBitlist {
    #[dynssz(size = "?", max = "64")]
    flags: BitsValue,
}

#[test]
fn bitlist_field_round_trips() {
    let codec = Codec::new(SpecValues::empty());
    let value = WithBitlist {
        flags: BitsValue::from_bits([true, false, true]),
    };
    let bytes = codec.marshal(&value).unwrap();
    let decoded: WithBitlist = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct VariantA {
    x: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
struct VariantB {
    y: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
enum Either {
    A(VariantA),
    B(VariantB),
}

#[test]
fn compatible_union_is_one_based_without_a_progressive_variant() {
    let codec = Codec::new(SpecValues::empty());
    let value = Either::A(VariantA { x: 7 });
    let bytes = codec.marshal(&value).unwrap();
    assert_eq!(bytes[0], 1);
    let decoded: Either = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);

    let value = Either::B(VariantB { y: 8 });
    let bytes = codec.marshal(&value).unwrap();
    assert_eq!(bytes[0], 2);
    let decoded: Either = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
#[dynssz(container = "progressive-container")]
struct ProgressiveVariant {
    #[dynssz(index = 0)]
    z: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, SszReflect)]
enum WithProgressiveVariant {
    Plain(VariantA),
    Progressive(ProgressiveVariant),
}

#[test]
fn compatible_union_is_zero_based_with_a_progressive_variant() {
    let codec = Codec::new(SpecValues::empty());
    let value = WithProgressiveVariant::Plain(VariantA { x: 1 });
    let bytes = codec.marshal(&value).unwrap();
    assert_eq!(bytes[0], 0);
    let decoded: WithProgressiveVariant = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);

    let value = WithProgressiveVariant::Progressive(ProgressiveVariant { z: 9 });
    let bytes = codec.marshal(&value).unwrap();
    assert_eq!(bytes[0], 1);
    let decoded: WithProgressiveVariant = codec.unmarshal(&bytes).unwrap();
    assert_eq!(decoded, value);
}
