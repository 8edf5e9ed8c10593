//! A pooled, incremental Merkle hasher: bytes are written as they become available and reduced
//! to a single root on `finish`, padding any leaves the caller never wrote with the zero-hash
//! ladder rather than a literal zero-filled buffer.

use crate::{BYTES_PER_CHUNK, TreeHashDigest};

/// Errors produced while writing to or finishing a [`MerkleHasher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// More bytes were written than the declared leaf count can hold.
    #[error("too many bytes written: capacity is {capacity} bytes")]
    TooManyBytes {
        /// The hasher's total byte capacity (`leaves * 32`).
        capacity: usize,
    },
}

/// Accumulates serialized bytes for a fixed number of 32-byte leaves, then reduces them
/// pairwise to a root.
///
/// `with_leaves` rounds its argument up to the next power of two: every SSZ Merkle tree is a
/// complete binary tree, so a non-power-of-two leaf count would leave the rightmost subtree
/// unbalanced.
#[derive(Debug)]
pub struct MerkleHasher<H> {
    leaves: usize,
    buffer: Vec<u8>,
    _hasher: std::marker::PhantomData<H>,
}

impl<H: TreeHashDigest> MerkleHasher<H> {
    /// Prepares a hasher with capacity for at least `min_leaves` leaves (rounded up to a power
    /// of two, minimum one).
    pub fn with_leaves(min_leaves: usize) -> Self {
        Self {
            leaves: min_leaves.next_power_of_two().max(1),
            buffer: Vec::new(),
            _hasher: std::marker::PhantomData,
        }
    }

    /// Appends bytes to the leaf buffer.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let capacity = self.leaves * BYTES_PER_CHUNK;
        if self.buffer.len() + bytes.len() > capacity {
            return Err(Error::TooManyBytes { capacity });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Reduces the written bytes (zero-padding any unwritten leaves) to a single root.
    pub fn finish(self) -> Result<H::Output, Error> {
        Ok(merkleize_bytes::<H>(&self.buffer, self.leaves))
    }
}

/// Reduces `bytes`, split into 32-byte leaves and zero-padded out to `leaves` (itself rounded
/// up to a power of two), to a single Merkle root.
pub fn merkleize_bytes<H: TreeHashDigest>(bytes: &[u8], leaves: usize) -> H::Output {
    let leaves = leaves.next_power_of_two().max(1);
    if leaves == 1 {
        return H::from_bytes(bytes);
    }

    let mut level: Vec<H::Output> = (0..leaves)
        .map(|i| {
            let start = i * BYTES_PER_CHUNK;
            if start >= bytes.len() {
                H::get_zero_hash(0)
            } else {
                let end = (start + BYTES_PER_CHUNK).min(bytes.len());
                H::from_bytes(&bytes[start..end])
            }
        })
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| H::hash32_concat(pair[0].as_ref(), pair[1].as_ref()))
            .collect();
    }
    level.into_iter().next().expect("at least one leaf")
}

/// Reduces an already-rooted chunk list (each entry itself a sub-tree root rather than raw
/// bytes) to a single Merkle root over `capacity` leaves, zero-padding any leaves beyond
/// `chunks.len()`. Shared by stable- and progressive-container Merkleization, where the leaves
/// being combined are themselves roots, not packable bytes.
pub fn merkleize_roots<H: TreeHashDigest>(chunks: &[H::Output], capacity: usize) -> H::Output {
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
