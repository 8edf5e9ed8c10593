//! Merkleization of progressive (unbounded-depth) lists, bitlists, and containers.
//!
//! A progressive tree trades a single balanced binary tree for a sequence of layers of
//! geometric capacity — layer 0 holds 1 chunk, layer 1 holds 4, layer 2 holds 16, and so on,
//! each 4x the last — so that appending elements never changes the depth of chunks already
//! placed in an earlier, lower-capacity layer. Each layer is itself a balanced binary
//! sub-tree; layers are combined outermost-first via `hash32_concat`, with the (possibly
//! empty) remaining layers on the right represented by a single zero-hash placeholder when
//! empty.

use crate::TreeHashDigest;

/// The capacity of progressive layer `i`: `4^i`.
fn layer_capacity(i: u32) -> usize {
    4usize.pow(i)
}

/// Merkleizes `chunks` (each already a 32-byte leaf) using the progressive layering scheme.
///
/// Splits `chunks` across layers of capacity `1, 4, 16, 64, ...` until every chunk has a
/// home, Merkleizes each occupied layer as its own balanced sub-tree, then folds the layers
/// together from the innermost (highest-capacity, rightmost) outward: `hash(layer_root,
/// hash(next_layer_root, ...))`.
pub fn progressive_merkleize_with_hasher<H: TreeHashDigest>(chunks: &[H::Output]) -> H::Output {
    if chunks.is_empty() {
        return H::get_zero_hash(0);
    }

    let mut layers: Vec<&[H::Output]> = Vec::new();
    let mut consumed = 0usize;
    let mut depth = 0u32;
    while consumed < chunks.len() {
        let cap = layer_capacity(depth);
        let take = cap.min(chunks.len() - consumed);
        layers.push(&chunks[consumed..consumed + take]);
        consumed += take;
        depth += 1;
    }

    let mut acc = H::get_zero_hash(0);
    for (i, layer) in layers.iter().enumerate().rev() {
        let cap = layer_capacity(i as u32);
        let layer_root = merkleize_roots_padded::<H>(layer, cap);
        acc = H::hash32_concat(layer_root.as_ref(), acc.as_ref());
    }
    acc
}

/// Merkleizes an already-rooted chunk slice into a balanced tree of `capacity` leaves
/// (rounded to a power of two), zero-padding the remainder.
fn merkleize_roots_padded<H: TreeHashDigest>(chunks: &[H::Output], capacity: usize) -> H::Output {
    let capacity = capacity.next_power_of_two().max(1);
    if capacity == 1 {
        return chunks.first().cloned().unwrap_or_else(|| H::get_zero_hash(0));
    }
    let mut level: Vec<H::Output> = (0..capacity)
        .map(|i| chunks.get(i).cloned().unwrap_or_else(|| H::get_zero_hash(0)))
        .collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| H::hash32_concat(pair[0].as_ref(), pair[1].as_ref()))
            .collect();
    }
    level.into_iter().next().expect("at least one leaf")
}

/// Merkleizes packable byte data (the result of marshaling a run of basic-type elements)
/// using the progressive layering scheme: bytes are split into 32-byte chunks first, then
/// those chunks are distributed across layers exactly as [`progressive_merkleize_with_hasher`]
/// does for pre-rooted chunks.
pub fn progressive_merkleize_bytes<H: TreeHashDigest>(bytes: &[u8]) -> H::Output {
    if bytes.is_empty() {
        return H::get_zero_hash(0);
    }
    let num_chunks = bytes.len().div_ceil(crate::BYTES_PER_CHUNK);
    let chunks: Vec<H::Output> = (0..num_chunks)
        .map(|i| {
            let start = i * crate::BYTES_PER_CHUNK;
            let end = (start + crate::BYTES_PER_CHUNK).min(bytes.len());
            H::from_bytes(&bytes[start..end])
        })
        .collect();
    progressive_merkleize_with_hasher::<H>(&chunks)
}
