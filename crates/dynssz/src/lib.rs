// Modified in 2025 from the original version
// Original source licensed under the Apache License 2.0

//! A SimpleSerialize (SSZ) codec engine whose type shapes are partly resolved at runtime
//! from a named spec-value table, rather than baked in at compile time.
//!
//! Ethereum consensus data comes in more than one preset (mainnet, minimal, and assorted
//! testnets), and the same container type can have different vector lengths and list
//! maxima depending on which preset is in force. A statically generated codec has to pick
//! one preset at compile time; this crate instead builds a [`descriptor::TypeDescriptor`]
//! tree for a type *and* a [`spec::SpecValues`] table together, caches it, and drives
//! marshaling, unmarshaling, sizing, and Merkleization off that tree.
//!
//! ```
//! use dynssz::{Codec, SpecValues};
//!
//! let codec = Codec::new(SpecValues::from_iter([("SLOTS_PER_EPOCH".to_string(), 32u64)]));
//! let bytes = codec.marshal(&1337u16).unwrap();
//! assert_eq!(bytes, vec![0x39, 0x05]);
//! let decoded: u16 = codec.unmarshal(&bytes).unwrap();
//! assert_eq!(decoded, 1337);
//! ```

pub mod bits;
pub mod codec;
pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod hash;
pub mod marshal;
pub mod primitives_impl;
pub mod schema;
pub mod size;
pub mod spec;
pub mod tags;
pub mod unmarshal;
pub mod value;

pub use codec::{Codec, CodecOptions};
pub use descriptor::{DescriptorCache, TypeDescriptor};
pub use error::SszError;
pub use schema::SszReflect;
pub use spec::SpecValues;
pub use value::DynValue;

/// The number of bytes used to represent an offset.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;
/// The number of bytes used to indicate the variant of a compatible union.
pub const BYTES_PER_UNION_SELECTOR: usize = 1;
/// The highest union selector value reserved for ordinary (non-backwards-compatible) use.
pub const MAX_UNION_SELECTOR: u8 = 127;
