//! [`DynValue`]: the uniform runtime representation every engine stage operates on.
//!
//! Rust's static types carry no runtime shape information, so the descriptor builder, size
//! engine, marshaler, unmarshaler, and hasher are all written against this single recursive
//! enum instead of against concrete caller types. A caller's own type is converted to and
//! from `DynValue` only at the boundary, via [`crate::schema::SszReflect::to_dyn`] and
//! [`crate::schema::SszReflect::from_dyn`].

use crate::bits::BitsValue;
use dynssz_primitives::{U128, U256};

/// A value tagged with enough shape information to drive marshaling, unmarshaling, sizing,
/// and Merkleization without consulting the original Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynValue {
    /// `bool`.
    Bool(bool),
    /// `u8`.
    U8(u8),
    /// `u16`.
    U16(u16),
    /// `u32`.
    U32(u32),
    /// `u64`.
    U64(u64),
    /// A 128-bit unsigned integer.
    U128(U128),
    /// A 256-bit unsigned integer.
    U256(U256),
    /// A container's fields, in declaration order, each paired with its field name.
    Container(Vec<(&'static str, DynValue)>),
    /// A fixed- or spec-resolved-length sequence.
    Vector(Vec<DynValue>),
    /// An unbounded (maximum-bearing) sequence.
    List(Vec<DynValue>),
    /// A fixed-length bit sequence.
    Bitvector(BitsValue),
    /// A maximum-bearing bit sequence.
    Bitlist(BitsValue),
    /// A compatible union: the selector and the boxed variant value.
    Union {
        /// The selected variant's index.
        selector: u8,
        /// The variant's value.
        value: Box<DynValue>,
    },
    /// A single-field passthrough: the held value is treated as if it had no wrapping.
    Wrapper(Box<DynValue>),
}

impl DynValue {
    /// A short name for this value's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DynValue::Bool(_) => "bool",
            DynValue::U8(_) => "u8",
            DynValue::U16(_) => "u16",
            DynValue::U32(_) => "u32",
            DynValue::U64(_) => "u64",
            DynValue::U128(_) => "u128",
            DynValue::U256(_) => "u256",
            DynValue::Container(_) => "container",
            DynValue::Vector(_) => "vector",
            DynValue::List(_) => "list",
            DynValue::Bitvector(_) => "bitvector",
            DynValue::Bitlist(_) => "bitlist",
            DynValue::Union { .. } => "union",
            DynValue::Wrapper(_) => "wrapper",
        }
    }
}
