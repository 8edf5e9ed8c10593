//! [`SszReflect`] impls for the fixed-shape types in [`dynssz_primitives`], plus the generic
//! `[T; N]` array.
//!
//! `Vec<T>`'s own impl (in [`crate::schema`]) already tolerates being read back from either a
//! [`DynValue::List`] or [`DynValue::Vector`] — so a container field annotated as a fixed-length
//! vector can still hold a `Vec<T>` in Rust. These impls extend the same tolerance to arrays and
//! the little primitives crate's byte types, which are the more common way to spell a
//! fixed-length vector field.

use dynssz_primitives::{Bytes, FixedBytes, U128, U256};

use crate::error::SszError;
use crate::schema::{SchemaNode, SszReflect};
use crate::value::DynValue;

impl SszReflect for U128 {
    fn schema() -> SchemaNode {
        SchemaNode::U128
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::U128(*self)
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        match value {
            DynValue::U128(v) => Ok(v),
            other => Err(SszError::UnsupportedType(format!(
                "expected u128, got {}",
                other.kind_name()
            ))),
        }
    }
}

impl SszReflect for U256 {
    fn schema() -> SchemaNode {
        SchemaNode::U256
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::U256(*self)
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        match value {
            DynValue::U256(v) => Ok(v),
            other => Err(SszError::UnsupportedType(format!(
                "expected u256, got {}",
                other.kind_name()
            ))),
        }
    }
}

impl<const N: usize> SszReflect for FixedBytes<N> {
    fn schema() -> SchemaNode {
        SchemaNode::Vector(Box::new(SchemaNode::U8))
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::Vector(self.0.iter().map(|b| DynValue::U8(*b)).collect())
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        let items = sequence_items(value, N)?;
        let mut out = [0u8; N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = expect_u8(item)?;
        }
        Ok(FixedBytes(out))
    }
}

impl SszReflect for Bytes {
    fn schema() -> SchemaNode {
        SchemaNode::List(Box::new(SchemaNode::U8))
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::List(self.0.iter().map(|b| DynValue::U8(*b)).collect())
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        let items = match value {
            DynValue::List(items) | DynValue::Vector(items) => items,
            other => {
                return Err(SszError::UnsupportedType(format!(
                    "expected a sequence of bytes, got {}",
                    other.kind_name()
                )))
            }
        };
        let bytes = items.into_iter().map(expect_u8).collect::<Result<Vec<u8>, _>>()?;
        Ok(Bytes(bytes))
    }
}

impl<T: SszReflect, const N: usize> SszReflect for [T; N] {
    fn schema() -> SchemaNode {
        SchemaNode::Vector(Box::new(T::schema()))
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::Vector(self.iter().map(SszReflect::to_dyn).collect())
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        let items = sequence_items(value, N)?;
        let vec: Vec<T> = items.into_iter().map(T::from_dyn).collect::<Result<_, _>>()?;
        vec.try_into().map_err(|v: Vec<T>| {
            SszError::IncorrectSize {
                got: v.len(),
                expected: N,
            }
        })
    }
}

fn sequence_items(value: DynValue, expected_len: usize) -> Result<Vec<DynValue>, SszError> {
    let items = match value {
        DynValue::Vector(items) | DynValue::List(items) => items,
        other => {
            return Err(SszError::UnsupportedType(format!(
                "expected a sequence of length {expected_len}, got {}",
                other.kind_name()
            )))
        }
    };
    if items.len() != expected_len {
        return Err(SszError::IncorrectSize {
            got: items.len(),
            expected: expected_len,
        });
    }
    Ok(items)
}

fn expect_u8(value: DynValue) -> Result<u8, SszError> {
    match value {
        DynValue::U8(b) => Ok(b),
        other => Err(SszError::UnsupportedType(format!(
            "expected u8, got {}",
            other.kind_name()
        ))),
    }
}
