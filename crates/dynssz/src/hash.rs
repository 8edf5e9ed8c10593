//! The hash-tree-root dispatcher: walks a [`TypeDescriptor`]/[`DynValue`] pair and produces
//! the SSZ Merkle root, mirroring [`crate::marshal`]'s structure but folding roots upward
//! instead of writing bytes forward.

use std::sync::Mutex;

use dynssz_tree_hash::{
    MerkleHasher, TreeHashDigest, mix_in_aux_with_hasher, mix_in_length_with_hasher,
    mix_in_selector_with_hasher, progressive_merkleize_bytes, progressive_merkleize_with_hasher,
};

use crate::bits::BitsValue;
use crate::descriptor::{ContainerDescriptor, DescriptorKind, TypeDescriptor};
use crate::encode::BufferEncoder;
use crate::error::{PathSegment, ResultExt, SszError};
use crate::marshal;
use crate::value::DynValue;

/// A process-lifetime free-list of scratch byte buffers for Merkleization.
///
/// Every hash-tree-root computation marshals some sub-tree of the value into a flat byte buffer
/// before reducing it (see [`marshal_bytes`]/[`marshal_packed`]); for a `Codec` that hashes many
/// values of the same shape, allocating and dropping that buffer on every call is wasted work.
/// A [`HasherPool`] hands out a buffer on [`HasherPool::acquire`] and takes it back (cleared, but
/// with its capacity retained) on [`HasherPool::release`]; get/put is the only shared mutable
/// state `hash_tree_root` touches besides the descriptor cache.
#[derive(Debug, Default)]
pub struct HasherPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl HasherPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a buffer from the free list, or allocates a fresh one if the list is empty.
    pub fn acquire(&self) -> Vec<u8> {
        self.free.lock().expect("hasher pool poisoned").pop().unwrap_or_default()
    }

    /// Clears `buf` and returns it to the free list for reuse.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.lock().expect("hasher pool poisoned").push(buf);
    }
}

/// `true` for the basic leaf kinds SSZ packs several-per-chunk rather than Merkleizing
/// individually; every other kind contributes one whole chunk (its own root) per element.
fn is_packable(kind: &DescriptorKind) -> bool {
    matches!(
        kind,
        DescriptorKind::Bool
            | DescriptorKind::U8
            | DescriptorKind::U16
            | DescriptorKind::U32
            | DescriptorKind::U64
            | DescriptorKind::Uint128
            | DescriptorKind::Uint256
    )
}

/// `CalculateLimit(max, n, element_size) = max(1, ceil(max * element_size / 32))` — the
/// chunk-count bound used for a list's Merkleization depth, independent of the value's actual
/// runtime length.
fn calculate_limit(max: u64, element_size_bytes: u64) -> usize {
    std::cmp::max(1, (max * element_size_bytes).div_ceil(32)) as usize
}

fn merkle_root_with_hasher<H: TreeHashDigest>(bytes: &[u8], minimum_leaf_count: usize) -> H::Output {
    dynssz_tree_hash::merkle_root_with_hasher::<H>(bytes, minimum_leaf_count)
}

/// Serializes `value` under `descriptor` into a pool-provided flat byte buffer (no offsets —
/// only ever called for packable, fixed-size kinds, which never have dynamic fields).
fn marshal_bytes(
    descriptor: &TypeDescriptor,
    value: &DynValue,
    pool: &HasherPool,
) -> Result<Vec<u8>, SszError> {
    let mut enc = BufferEncoder::with_buffer(pool.acquire());
    marshal::marshal(descriptor, value, &mut enc, None)?;
    Ok(enc.into_bytes())
}

/// Computes the SSZ hash tree root of `value` under `descriptor`, using digest algorithm `H` and
/// drawing scratch buffers from `pool`.
pub fn hash_tree_root<H: TreeHashDigest>(
    descriptor: &TypeDescriptor,
    value: &DynValue,
    pool: &HasherPool,
) -> Result<H::Output, SszError> {
    if is_packable(&descriptor.kind) {
        let bytes = marshal_bytes(descriptor, value, pool)?;
        let root = merkle_root_with_hasher::<H>(&bytes, 1);
        pool.release(bytes);
        return Ok(root);
    }

    match (&descriptor.kind, value) {
        (DescriptorKind::Container(cd), DynValue::Container(fields)) => {
            container_root::<H>(cd, fields, pool)
        }

        (DescriptorKind::StableContainer(cd, capacity), DynValue::Container(fields)) => {
            stable_container_root::<H>(cd, *capacity, fields, pool)
        }

        (DescriptorKind::ProgressiveContainer(cd), DynValue::Container(fields)) => {
            progressive_container_root::<H>(cd, fields, pool)
        }

        (DescriptorKind::Vector(sd), DynValue::Vector(items))
        | (DescriptorKind::Vector(sd), DynValue::List(items)) => {
            let len = sd.len.unwrap_or(items.len() as u64);
            let padded = pad_to_len(&sd.element, items, len)?;
            if is_packable(&sd.element.kind) {
                let bytes = marshal_packed::<H>(&sd.element, &padded, pool)?;
                let root = merkle_root_with_hasher::<H>(&bytes, 0);
                pool.release(bytes);
                Ok(root)
            } else {
                let chunks = element_roots::<H>(&sd.element, &padded, pool)?;
                let concatenated = concat_chunks::<H>(&chunks, pool);
                let root = merkle_root_with_hasher::<H>(&concatenated, 0);
                pool.release(concatenated);
                Ok(root)
            }
        }

        (DescriptorKind::List(sd), DynValue::List(items)) => {
            let max = sd.max.ok_or_else(|| {
                SszError::UnsupportedType("list descriptor missing a max for hashing".into())
            })?;
            check_max(items.len() as u64, max)?;
            let (root, _) = sequence_root::<H>(&sd.element, items, max, pool)?;
            Ok(mix_in_length_with_hasher::<H>(&root, items.len() as u64))
        }

        (DescriptorKind::ProgressiveList(sd), DynValue::List(items)) => {
            let root = if is_packable(&sd.element.kind) {
                let bytes = marshal_packed::<H>(&sd.element, items, pool)?;
                let root = progressive_merkleize_bytes::<H>(&bytes);
                pool.release(bytes);
                root
            } else {
                let chunks = element_roots::<H>(&sd.element, items, pool)?;
                progressive_merkleize_with_hasher::<H>(&chunks)
            };
            Ok(mix_in_length_with_hasher::<H>(&root, items.len() as u64))
        }

        (DescriptorKind::Bitvector(_), DynValue::Bitvector(bits)) => {
            bits.check_padding_zero()?;
            Ok(merkle_root_with_hasher::<H>(bits.as_bytes(), 0))
        }

        (DescriptorKind::Bitlist(bd), DynValue::Bitlist(bits)) => {
            let max = bd.max.ok_or_else(|| {
                SszError::UnsupportedType("bitlist descriptor missing a max for hashing".into())
            })?;
            check_max(bits.len() as u64, max)?;
            let limit = std::cmp::max(1, max.div_ceil(256)) as usize;
            let root = merkle_root_with_hasher::<H>(bits.as_bytes(), limit);
            Ok(mix_in_length_with_hasher::<H>(&root, bits.len() as u64))
        }

        (DescriptorKind::ProgressiveBitlist(_), DynValue::Bitlist(bits)) => {
            let root = progressive_merkleize_bytes::<H>(bits.as_bytes());
            Ok(mix_in_length_with_hasher::<H>(&root, bits.len() as u64))
        }

        (DescriptorKind::Wrapper(inner), DynValue::Wrapper(inner_value)) => {
            hash_tree_root::<H>(inner, inner_value, pool)
        }

        (DescriptorKind::Union(variants), DynValue::Union { selector, value }) => {
            let variant = variants
                .iter()
                .find(|(sel, _)| sel == selector)
                .ok_or(SszError::InvalidUnionVariant(*selector))?;
            let inner_root = hash_tree_root::<H>(&variant.1, value, pool)
                .context(PathSegment::Variant(*selector))?;
            mix_in_selector_with_hasher::<H>(&inner_root, *selector)
                .ok_or(SszError::InvalidUnionVariant(*selector))
        }

        (kind, other) => Err(SszError::UnsupportedType(format!(
            "{kind:?} cannot hash a {} value",
            other.kind_name()
        ))),
    }
}

fn check_max(len: u64, max: u64) -> Result<(), SszError> {
    if len > max {
        return Err(SszError::ListTooBig {
            len: len as usize,
            max: max as usize,
        });
    }
    Ok(())
}

/// Zero-extends `items` up to `target_len` with zero values of `element`'s shape, so a
/// short-input vector Merkleizes to the same root as its fully zero-padded counterpart.
fn pad_to_len(
    element: &TypeDescriptor,
    items: &[DynValue],
    target_len: u64,
) -> Result<Vec<DynValue>, SszError> {
    if items.len() as u64 >= target_len {
        return Ok(items.to_vec());
    }
    let mut padded = items.to_vec();
    for _ in items.len() as u64..target_len {
        padded.push(zero_value(element));
    }
    Ok(padded)
}

fn zero_value(descriptor: &TypeDescriptor) -> DynValue {
    match &descriptor.kind {
        DescriptorKind::Bool => DynValue::Bool(false),
        DescriptorKind::U8 => DynValue::U8(0),
        DescriptorKind::U16 => DynValue::U16(0),
        DescriptorKind::U32 => DynValue::U32(0),
        DescriptorKind::U64 => DynValue::U64(0),
        DescriptorKind::Uint128 => DynValue::U128(Default::default()),
        DescriptorKind::Uint256 => DynValue::U256(Default::default()),
        DescriptorKind::Container(cd)
        | DescriptorKind::ProgressiveContainer(cd)
        | DescriptorKind::StableContainer(cd, _) => DynValue::Container(
            cd.fields
                .iter()
                .map(|f| (f.name, zero_value(&f.descriptor)))
                .collect(),
        ),
        DescriptorKind::Vector(sd) => {
            let len = sd.len.unwrap_or(0);
            DynValue::Vector((0..len).map(|_| zero_value(&sd.element)).collect())
        }
        DescriptorKind::List(_) | DescriptorKind::ProgressiveList(_) => DynValue::List(Vec::new()),
        DescriptorKind::Bitvector(bd) => BitsValue::zeros(bd.len.unwrap_or(0) as usize).into(),
        DescriptorKind::Bitlist(_) | DescriptorKind::ProgressiveBitlist(_) => {
            BitsValue::zeros(0).into()
        }
        DescriptorKind::Wrapper(inner) => DynValue::Wrapper(Box::new(zero_value(inner))),
        DescriptorKind::Union(variants) => {
            let (selector, first) = &variants[0];
            DynValue::Union {
                selector: *selector,
                value: Box::new(zero_value(first)),
            }
        }
    }
}

/// Marshals a run of packable elements back to back into one pool-provided flat buffer.
fn marshal_packed(
    element: &TypeDescriptor,
    items: &[DynValue],
    pool: &HasherPool,
) -> Result<Vec<u8>, SszError> {
    let mut enc = BufferEncoder::with_buffer(pool.acquire());
    for (i, item) in items.iter().enumerate() {
        marshal::marshal(element, item, &mut enc, None).context(PathSegment::Index(i))?;
    }
    Ok(enc.into_bytes())
}

/// Computes one root per element (used for composite, non-packable element kinds).
fn element_roots<H: TreeHashDigest>(
    element: &TypeDescriptor,
    items: &[DynValue],
    pool: &HasherPool,
) -> Result<Vec<H::Output>, SszError> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| hash_tree_root::<H>(element, item, pool).context(PathSegment::Index(i)))
        .collect()
}

/// Concatenates `chunks` into one pool-provided flat buffer.
fn concat_chunks<H: TreeHashDigest>(chunks: &[H::Output], pool: &HasherPool) -> Vec<u8> {
    let mut out = pool.acquire();
    out.reserve(chunks.len() * 32);
    for c in chunks {
        out.extend_from_slice(c.as_ref());
    }
    out
}

/// Merkleizes `items` (not zero-padded — list length is mixed in separately, not baked into
/// the tree shape) over `CalculateLimit(max, _, element_size)` leaves.
fn sequence_root<H: TreeHashDigest>(
    element: &TypeDescriptor,
    items: &[DynValue],
    max: u64,
    pool: &HasherPool,
) -> Result<(H::Output, usize), SszError> {
    if is_packable(&element.kind) {
        let element_size = element
            .static_size
            .expect("packable kinds are always fixed-size");
        let limit = calculate_limit(max, element_size);
        let bytes = marshal_packed::<H>(element, items, pool)?;
        let root = merkle_root_with_hasher::<H>(&bytes, limit);
        pool.release(bytes);
        Ok((root, limit))
    } else {
        let limit = calculate_limit(max, 32);
        let chunks = element_roots::<H>(element, items, pool)?;
        let bytes = concat_chunks::<H>(&chunks, pool);
        let root = merkle_root_with_hasher::<H>(&bytes, limit);
        pool.release(bytes);
        Ok((root, limit))
    }
}

fn container_root<H: TreeHashDigest>(
    cd: &ContainerDescriptor,
    fields: &[(&'static str, DynValue)],
    pool: &HasherPool,
) -> Result<H::Output, SszError> {
    let mut chunks = Vec::with_capacity(cd.fields.len());
    for (field_desc, (name, field_value)) in cd.fields.iter().zip(fields.iter()) {
        let root = hash_tree_root::<H>(&field_desc.descriptor, field_value, pool)
            .context(PathSegment::Field(name))?;
        chunks.push(root);
    }
    let bytes = concat_chunks::<H>(&chunks, pool);
    let root = merkle_root_with_hasher::<H>(&bytes, 0);
    pool.release(bytes);
    Ok(root)
}

/// A stable container's fixed-capacity tree, mixing in a bitmap of which field slots are
/// populated.
///
/// The engine's [`DynValue::Container`] has no representation for an absent optional field —
/// every declared field always carries a value — so this realization treats every declared
/// field as permanently active. A type that wants genuine optionality must model the absent
/// case itself (e.g. as a zero/default value), which is recorded as an open design decision
/// rather than a limitation of the Merkleization rule itself.
fn stable_container_root<H: TreeHashDigest>(
    cd: &ContainerDescriptor,
    capacity: u64,
    fields: &[(&'static str, DynValue)],
    pool: &HasherPool,
) -> Result<H::Output, SszError> {
    let capacity = capacity as usize;
    let mut chunks = vec![H::get_zero_hash(0); capacity];
    let mut active = BitsValue::zeros(capacity);
    for (i, (field_desc, (name, field_value))) in
        cd.fields.iter().zip(fields.iter()).enumerate()
    {
        let slot = field_desc.ssz_index.map(usize::from).unwrap_or(i);
        let root = hash_tree_root::<H>(&field_desc.descriptor, field_value, pool)
            .context(PathSegment::Field(name))?;
        chunks[slot] = root;
        active.set(slot, true)?;
    }
    let bytes = concat_chunks::<H>(&chunks, pool);
    let container_root = merkle_root_with_hasher::<H>(&bytes, capacity);
    pool.release(bytes);
    let bitmap_root = merkle_root_with_hasher::<H>(active.as_bytes(), 0);
    Ok(mix_in_aux_with_hasher::<H>(&container_root, &bitmap_root))
}

/// A progressive container's sparse tree, addressed by `ssz-index`, mixing in a bitmap of
/// which indices are populated.
fn progressive_container_root<H: TreeHashDigest>(
    cd: &ContainerDescriptor,
    fields: &[(&'static str, DynValue)],
    pool: &HasherPool,
) -> Result<H::Output, SszError> {
    let max_index = cd
        .fields
        .iter()
        .filter_map(|f| f.ssz_index)
        .max()
        .map(|i| i as usize + 1)
        .unwrap_or(0);
    let mut chunks = vec![H::get_zero_hash(0); max_index];
    let mut active = BitsValue::zeros(max_index);
    for (field_desc, (name, field_value)) in cd.fields.iter().zip(fields.iter()) {
        let slot = field_desc.ssz_index.expect("enforced at descriptor build time") as usize;
        let root = hash_tree_root::<H>(&field_desc.descriptor, field_value, pool)
            .context(PathSegment::Field(name))?;
        chunks[slot] = root;
        active.set(slot, true)?;
    }
    let container_root = progressive_merkleize_with_hasher::<H>(&chunks);
    let bitmap_root = if active.is_empty() {
        H::get_zero_hash(0)
    } else {
        merkle_root_with_hasher::<H>(active.as_bytes(), 0)
    };
    Ok(mix_in_aux_with_hasher::<H>(&container_root, &bitmap_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BitsDescriptor, FieldDescriptor, SeqDescriptor};
    use dynssz_tree_hash::Sha256Hasher;
    use std::sync::Arc;

    fn leaf(kind: DescriptorKind, size: u64) -> TypeDescriptor {
        TypeDescriptor {
            kind,
            static_size: Some(size),
            has_dynamic_spec: false,
        }
    }

    #[test]
    fn primitive_root_is_right_padded() {
        let pool = HasherPool::new();
        let d = leaf(DescriptorKind::U16, 2);
        let root = hash_tree_root::<Sha256Hasher>(&d, &DynValue::U16(1337), &pool).unwrap();
        let mut expected = [0u8; 32];
        expected[0..2].copy_from_slice(&1337u16.to_le_bytes());
        assert_eq!(root.as_ref(), &expected[..]);
    }

    #[test]
    fn fixed_vector_short_input_matches_zero_padded_root() {
        let pool = HasherPool::new();
        let element = Arc::new(leaf(DescriptorKind::U8, 1));
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Vector(SeqDescriptor {
                element,
                len: Some(10),
                max: None,
            }),
            static_size: Some(10),
            has_dynamic_spec: false,
        };
        let short = DynValue::Vector(vec![DynValue::U8(1), DynValue::U8(2), DynValue::U8(3)]);
        let mut padded_items = vec![DynValue::U8(1), DynValue::U8(2), DynValue::U8(3)];
        padded_items.extend((3..10).map(|_| DynValue::U8(0)));
        let padded = DynValue::Vector(padded_items);

        let root_short = hash_tree_root::<Sha256Hasher>(&descriptor, &short, &pool).unwrap();
        let root_padded = hash_tree_root::<Sha256Hasher>(&descriptor, &padded, &pool).unwrap();
        assert_eq!(root_short.as_ref(), root_padded.as_ref());
    }

    #[test]
    fn list_mixes_in_actual_length() {
        let pool = HasherPool::new();
        let element = Arc::new(leaf(DescriptorKind::U8, 1));
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::List(SeqDescriptor {
                element,
                len: None,
                max: Some(10),
            }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let a = DynValue::List(vec![DynValue::U8(1), DynValue::U8(2)]);
        let b = DynValue::List(vec![DynValue::U8(1), DynValue::U8(2), DynValue::U8(3)]);
        let root_a = hash_tree_root::<Sha256Hasher>(&descriptor, &a, &pool).unwrap();
        let root_b = hash_tree_root::<Sha256Hasher>(&descriptor, &b, &pool).unwrap();
        assert_ne!(root_a.as_ref(), root_b.as_ref());
    }

    #[test]
    fn container_root_is_field_roots_merkleized() {
        let pool = HasherPool::new();
        let bool_d = Arc::new(leaf(DescriptorKind::Bool, 1));
        let u8_d = Arc::new(leaf(DescriptorKind::U8, 1));
        let cd = ContainerDescriptor {
            fields: vec![
                FieldDescriptor {
                    name: "a",
                    descriptor: bool_d,
                    is_dynamic: false,
                    ssz_index: None,
                },
                FieldDescriptor {
                    name: "b",
                    descriptor: u8_d,
                    is_dynamic: false,
                    ssz_index: None,
                },
            ],
            fixed_portion_size: 2,
        };
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Container(cd),
            static_size: Some(2),
            has_dynamic_spec: false,
        };
        let value =
            DynValue::Container(vec![("a", DynValue::Bool(true)), ("b", DynValue::U8(7))]);
        let root = hash_tree_root::<Sha256Hasher>(&descriptor, &value, &pool).unwrap();

        let a_root = hash_tree_root::<Sha256Hasher>(
            &leaf(DescriptorKind::Bool, 1),
            &DynValue::Bool(true),
            &pool,
        )
        .unwrap();
        let b_root =
            hash_tree_root::<Sha256Hasher>(&leaf(DescriptorKind::U8, 1), &DynValue::U8(7), &pool)
                .unwrap();
        let expected = Sha256Hasher::hash32_concat(a_root.as_ref(), b_root.as_ref());
        assert_eq!(root.as_ref(), expected.as_ref());
    }

    #[test]
    fn bitvector_root_rejects_nonzero_padding() {
        let pool = HasherPool::new();
        let mut bits = BitsValue::zeros(4);
        bits.set(0, true).unwrap();
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Bitvector(BitsDescriptor { len: Some(4), max: None }),
            static_size: Some(1),
            has_dynamic_spec: false,
        };
        assert!(
            hash_tree_root::<Sha256Hasher>(&descriptor, &DynValue::Bitvector(bits), &pool).is_ok()
        );

        let raw: smallvec::SmallVec<[u8; 32]> = smallvec::smallvec![0b1001_0000];
        let corrupted = BitsValue::from_raw(raw, 4).unwrap();
        assert!(matches!(
            hash_tree_root::<Sha256Hasher>(&descriptor, &DynValue::Bitvector(corrupted), &pool),
            Err(SszError::BitvectorPaddingNonZero)
        ));
    }

    #[test]
    fn empty_progressive_list_root_is_deterministic() {
        let pool = HasherPool::new();
        let element = Arc::new(leaf(DescriptorKind::U16, 2));
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::ProgressiveList(SeqDescriptor {
                element,
                len: None,
                max: None,
            }),
            static_size: None,
            has_dynamic_spec: false,
        };
        let empty = DynValue::List(Vec::new());
        let root_a = hash_tree_root::<Sha256Hasher>(&descriptor, &empty, &pool).unwrap();
        let root_b = hash_tree_root::<Sha256Hasher>(&descriptor, &empty, &pool).unwrap();
        assert_eq!(root_a.as_ref(), root_b.as_ref());
    }

    #[test]
    fn union_mixes_in_selector() {
        let pool = HasherPool::new();
        let descriptor = TypeDescriptor {
            kind: DescriptorKind::Union(vec![(0, leaf(DescriptorKind::U32, 4))]),
            static_size: None,
            has_dynamic_spec: false,
        };
        let value = DynValue::Union {
            selector: 0,
            value: Box::new(DynValue::U32(0x1234_5678)),
        };
        let root = hash_tree_root::<Sha256Hasher>(&descriptor, &value, &pool).unwrap();
        let inner_root = hash_tree_root::<Sha256Hasher>(
            &leaf(DescriptorKind::U32, 4),
            &DynValue::U32(0x1234_5678),
            &pool,
        )
        .unwrap();
        let expected = mix_in_selector_with_hasher::<Sha256Hasher>(&inner_root, 0).unwrap();
        assert_eq!(root.as_ref(), expected.as_ref());
    }
}
