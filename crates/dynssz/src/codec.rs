//! The [`Codec`]: the public entry point that ties a [`SpecValues`] table to the descriptor
//! cache and drives sizing, marshaling, unmarshaling, and Merkleization for any type that
//! implements [`SszReflect`].

use std::io::{Read, Write};

use dynssz_tree_hash::Sha256Hasher;

use crate::decode::Decoder;
use crate::descriptor::DescriptorCache;
use crate::encode::{BufferEncoder, StreamEncoder};
use crate::error::SszError;
use crate::schema::SszReflect;
use crate::size;
use crate::spec::SpecValues;
use crate::{hash, marshal, unmarshal};

/// Runtime knobs a [`Codec`] is configured with after construction.
///
/// None of these change a type's wire format; they only change which internal code path the
/// codec takes to produce it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    /// Skip [`FastPath`] delegation entirely and always walk the descriptor, even for types
    /// that offer a fast marshaler/unmarshaler and whose descriptor has no spec-dependent
    /// sizes. Useful for differential testing the descriptor-driven path against a type's own
    /// hand- or generator-written codec.
    pub disable_fast_path: bool,
    /// Prints a line to stderr on descriptor-cache misses/negative-hit replays and on
    /// fast-path delegation decisions. The engine has no logging/tracing dependency (the
    /// teacher carries none either); this is a plain `eprintln!` escape hatch, not a structured
    /// logging facility.
    pub verbose: bool,
    /// Force [`Codec::marshal_into`] to use a true forward-only stream encoder (computing a
    /// size tree ahead of writing each offset table) instead of buffering the encoding in
    /// memory and writing it to the sink in one shot.
    pub disable_stream_buffering: bool,
}

/// Ties a [`SpecValues`] table to a [`DescriptorCache`] and exposes the four public
/// operations: size, marshal, unmarshal, hash tree root.
///
/// Safe to share across threads: descriptor lookups take a shared lock and only a cache miss
/// takes the exclusive lock to insert (see [`DescriptorCache`]); hasher scratch buffers are
/// drawn from a [`hash::HasherPool`] behind its own lock. A `Codec` has no other shared mutable
/// state.
#[derive(Debug)]
pub struct Codec {
    spec: SpecValues,
    cache: DescriptorCache,
    hasher_pool: hash::HasherPool,
    options: CodecOptions,
}

impl Codec {
    /// Builds a codec bound to `spec`. The spec values are immutable for the codec's
    /// lifetime: every descriptor this codec ever caches is only valid for this table.
    pub fn new(spec: SpecValues) -> Self {
        Self {
            spec,
            cache: DescriptorCache::new(),
            hasher_pool: hash::HasherPool::new(),
            options: CodecOptions::default(),
        }
    }

    /// Replaces this codec's runtime options.
    pub fn configure(&mut self, options: CodecOptions) {
        self.options = options;
    }

    /// The spec-value table this codec was constructed with.
    pub fn spec_values(&self) -> &SpecValues {
        &self.spec
    }

    /// Encodes `value` to a freshly allocated byte vector.
    pub fn marshal<T: FastPath>(&self, value: &T) -> Result<Vec<u8>, SszError> {
        let descriptor = self.cache.get_or_build::<T>(&self.spec, self.options.verbose)?;

        if !self.options.disable_fast_path && !descriptor.has_dynamic_spec {
            if let Some(result) = value.fast_marshal() {
                if self.options.verbose {
                    eprintln!("dynssz: fast_marshal delegation taken for {}", std::any::type_name::<T>());
                }
                return result;
            }
        }

        let dyn_value = value.to_dyn();
        let mut enc = BufferEncoder::new();
        marshal::marshal(&descriptor, &dyn_value, &mut enc, None)?;
        Ok(enc.into_bytes())
    }

    /// Encodes `value` directly into `sink`.
    ///
    /// By default the encoding is built in memory first (so the buffered, seekable encoder
    /// can back-patch offsets) and then written to `sink` in one call, which is both simpler
    /// and immune to the streaming encoder's poisoned-on-error rule. Set
    /// [`CodecOptions::disable_stream_buffering`] to force the forward-only path described in
    /// the design notes: the size engine computes a size tree ahead of time so offsets can be
    /// written before their bodies exist.
    pub fn marshal_into<T: FastPath>(
        &self,
        value: &T,
        sink: &mut dyn Write,
    ) -> Result<(), SszError> {
        let descriptor = self.cache.get_or_build::<T>(&self.spec, self.options.verbose)?;
        let dyn_value = value.to_dyn();

        if self.options.disable_stream_buffering {
            let (_, tree) = size::value_size(&descriptor, &dyn_value, true)?;
            let mut enc = StreamEncoder::new(sink);
            marshal::marshal(&descriptor, &dyn_value, &mut enc, tree.as_ref())
        } else {
            let bytes = self.marshal(value)?;
            sink.write_all(&bytes)
                .map_err(|e| SszError::UnsupportedType(format!("stream write failed: {e}")))
        }
    }

    /// Decodes a value of type `T` from `bytes`.
    ///
    /// Rejects any bytes left over once the top-level value has been fully decoded
    /// ([`SszError::TrailingBytes`]).
    pub fn unmarshal<T: FastPath>(&self, bytes: &[u8]) -> Result<T, SszError> {
        let descriptor = self.cache.get_or_build::<T>(&self.spec, self.options.verbose)?;

        if !self.options.disable_fast_path && !descriptor.has_dynamic_spec {
            if let Some(result) = T::fast_unmarshal(bytes) {
                if self.options.verbose {
                    eprintln!("dynssz: fast_unmarshal delegation taken for {}", std::any::type_name::<T>());
                }
                return result;
            }
        }

        let mut dec = Decoder::new(bytes);
        let dyn_value = unmarshal::unmarshal(&descriptor, &mut dec)?;
        let leftover = bytes.len() - dec.position();
        if leftover != 0 {
            return Err(SszError::TrailingBytes { extra: leftover });
        }
        T::from_dyn(dyn_value)
    }

    /// Reads exactly `total_len` bytes from `source` and decodes a value of type `T` from
    /// them.
    ///
    /// The core has no random-access view of an arbitrary [`Read`]; `total_len` must be known
    /// up front (by the caller, e.g. from a length-prefixed transport) so the whole value can
    /// be buffered before decoding begins.
    pub fn unmarshal_from<T: FastPath>(
        &self,
        source: &mut dyn Read,
        total_len: usize,
    ) -> Result<T, SszError> {
        let mut buf = vec![0u8; total_len];
        source
            .read_exact(&mut buf)
            .map_err(|_| SszError::UnexpectedEof)?;
        self.unmarshal(&buf)
    }

    /// The exact encoded byte length of `value`.
    pub fn size<T: SszReflect>(&self, value: &T) -> Result<u64, SszError> {
        let descriptor = self.cache.get_or_build::<T>(&self.spec, self.options.verbose)?;
        let dyn_value = value.to_dyn();
        let (size, _) = size::value_size(&descriptor, &dyn_value, false)?;
        Ok(size)
    }

    /// The SSZ hash tree root of `value`, using SHA-256 as the hash function.
    pub fn hash_tree_root<T: SszReflect>(&self, value: &T) -> Result<[u8; 32], SszError> {
        let descriptor = self.cache.get_or_build::<T>(&self.spec, self.options.verbose)?;
        let dyn_value = value.to_dyn();
        let root = hash::hash_tree_root::<Sha256Hasher>(&descriptor, &dyn_value, &self.hasher_pool)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(root.as_ref());
        Ok(out)
    }
}

/// An opt-in fast path a [`SszReflect`] type may offer: a hand- or generator-written
/// marshaler/unmarshaler the codec prefers over the descriptor walker.
///
/// Blanket-implemented for every [`SszReflect`] type with both methods defaulting to `None`,
/// so implementing this trait is never required — a type only overrides the method it has a
/// faster path for. [`Codec::marshal`]/[`Codec::unmarshal`] only consult these methods when
/// [`CodecOptions::disable_fast_path`] is unset *and* the type's descriptor has no
/// spec-dependent sizes ([`crate::descriptor::TypeDescriptor::has_dynamic_spec`]); a static
/// codec compiled against one preset's defaults cannot honor a field whose size came from a
/// different spec value, so delegation is unconditionally disabled in that case (§6.2/§7).
pub trait FastPath: SszReflect {
    /// Attempts to encode `self` without walking the descriptor tree. Returns `None` to fall
    /// back to the descriptor-driven marshaler.
    fn fast_marshal(&self) -> Option<Result<Vec<u8>, SszError>> {
        None
    }

    /// Attempts to decode a value of `Self` from `bytes` without walking the descriptor tree.
    /// Returns `None` to fall back to the descriptor-driven unmarshaler.
    fn fast_unmarshal(_bytes: &[u8]) -> Option<Result<Self, SszError>>
    where
        Self: Sized,
    {
        None
    }
}

impl<T: SszReflect> FastPath for T {}
