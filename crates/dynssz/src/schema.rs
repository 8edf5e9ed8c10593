//! The runtime-inspectable shape of a Rust type.
//!
//! Rust has no runtime reflection, so every type the engine can operate over implements
//! [`SszReflect`], which hands back a [`SchemaNode`] tree describing its shape plus the
//! `#[dynssz(...)]` annotations that were attached to each field. The descriptor builder,
//! size engine, marshaler, unmarshaler, and hasher are all written once against this tree
//! (and against [`crate::value::DynValue`]), never against a specific Rust type.
//!
//! Implementations are normally generated by `#[derive(SszReflect)]` rather than written by
//! hand.

use crate::value::DynValue;
use crate::error::SszError;

/// The shape of a type, independent of any spec-value resolution.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    /// `bool`.
    Bool,
    /// `u8`.
    U8,
    /// `u16`.
    U16,
    /// `u32`.
    U32,
    /// `u64`.
    U64,
    /// A 128-bit unsigned integer leaf.
    U128,
    /// A 256-bit unsigned integer leaf.
    U256,
    /// A struct with named fields, each independently annotated.
    Container(Box<ContainerSchema>),
    /// A fixed- or spec-derived-length homogeneous sequence.
    Vector(Box<SchemaNode>),
    /// An unbounded (but maximum-bearing) homogeneous sequence.
    List(Box<SchemaNode>),
    /// A fixed-length bit sequence.
    Bitvector,
    /// A maximum-bearing bit sequence with an in-band length delimiter.
    Bitlist,
    /// A progressive (geometric-capacity) list.
    ProgressiveList(Box<SchemaNode>),
    /// A progressive (geometric-capacity) bitlist.
    ProgressiveBitlist,
    /// A single-field passthrough: the field's own annotations describe the held value, as
    /// if it were itself a top-level value.
    Wrapper(Box<SchemaNode>),
    /// A compatible union: an ordered set of `(selector, variant schema)` pairs.
    Union(Vec<(u8, SchemaNode)>),
}

/// The declared shape of a `container`/`progressive-container`/`stable-container`.
#[derive(Debug, Clone)]
pub struct ContainerSchema {
    /// The Rust type's name, used only for diagnostics.
    pub name: &'static str,
    /// Fields in declaration order.
    pub fields: Vec<FieldSchema>,
    /// Which container flavor this is.
    pub kind: ContainerKind,
}

/// Distinguishes the three container layouts the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// An ordinary SSZ container: fixed fields followed by an offset table.
    Regular,
    /// A progressive container: fields are addressed by `ssz-index` in a sparse Merkle tree.
    Progressive,
    /// A stable container: a regular container Merkleized into a fixed-capacity tree.
    Stable {
        /// The declared capacity of the backing tree.
        capacity: u64,
    },
}

/// One field of a [`ContainerSchema`].
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// The Rust field name.
    pub name: &'static str,
    /// The field's own shape.
    pub schema: SchemaNode,
    /// The `#[dynssz(...)]` annotations attached to this field.
    pub annotations: FieldAnnotations,
}

/// The raw, unresolved annotation strings/values attached to one field.
///
/// These are resolved against a [`crate::spec::SpecValues`] table by
/// [`crate::tags`] during descriptor construction.
#[derive(Debug, Clone, Default)]
pub struct FieldAnnotations {
    /// `ssz-size`, comma-separated, one token per dimension.
    pub ssz_size: Option<&'static str>,
    /// `dynssz-size`, comma-separated, one token per dimension.
    pub dynssz_size: Option<&'static str>,
    /// `ssz-max`, comma-separated, one token per dimension.
    pub ssz_max: Option<&'static str>,
    /// `dynssz-max`, comma-separated, one token per dimension.
    pub dynssz_max: Option<&'static str>,
    /// `ssz-type`, an explicit kind override.
    pub ssz_type: Option<&'static str>,
    /// `ssz-index`, required for progressive-container fields.
    pub ssz_index: Option<u16>,
}

/// A type the engine can marshal, unmarshal, size, and hash.
///
/// `'static` so a [`std::any::TypeId`] can serve as half of the descriptor-cache key; the
/// other half is the fingerprint of the spec values that were in scope when the descriptor
/// was built (see [`crate::spec::SpecValues::fingerprint`]).
pub trait SszReflect: Sized + 'static {
    /// Describes this type's shape, independent of any spec value.
    fn schema() -> SchemaNode;

    /// Converts a value into the engine's uniform runtime representation.
    fn to_dyn(&self) -> DynValue;

    /// Reconstructs a value from the engine's uniform runtime representation.
    ///
    /// Only called after a full, successful unmarshal: a `DynValue` produced by a partial or
    /// failed decode is never passed here.
    fn from_dyn(value: DynValue) -> Result<Self, SszError>;
}

macro_rules! impl_reflect_for_uint {
    ($ty:ty, $schema:ident, $variant:ident) => {
        impl SszReflect for $ty {
            fn schema() -> SchemaNode {
                SchemaNode::$schema
            }

            fn to_dyn(&self) -> DynValue {
                DynValue::$variant(*self)
            }

            fn from_dyn(value: DynValue) -> Result<Self, SszError> {
                match value {
                    DynValue::$variant(v) => Ok(v),
                    other => Err(SszError::UnsupportedType(format!(
                        "expected {}, got {other:?}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

impl_reflect_for_uint!(bool, Bool, Bool);
impl_reflect_for_uint!(u8, U8, U8);
impl_reflect_for_uint!(u16, U16, U16);
impl_reflect_for_uint!(u32, U32, U32);
impl_reflect_for_uint!(u64, U64, U64);

impl<T: SszReflect> SszReflect for Vec<T> {
    fn schema() -> SchemaNode {
        SchemaNode::List(Box::new(T::schema()))
    }

    fn to_dyn(&self) -> DynValue {
        DynValue::List(self.iter().map(SszReflect::to_dyn).collect())
    }

    fn from_dyn(value: DynValue) -> Result<Self, SszError> {
        match value {
            DynValue::List(items) | DynValue::Vector(items) => {
                items.into_iter().map(T::from_dyn).collect()
            }
            other => Err(SszError::UnsupportedType(format!(
                "expected a sequence, got {other:?}"
            ))),
        }
    }
}
