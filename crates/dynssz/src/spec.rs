//! The spec-value table a [`crate::codec::Codec`] is configured with.

use std::collections::HashMap;

/// An immutable name → value table used to resolve `dynssz-*` expressions.
///
/// Constructed once, at [`crate::codec::Codec`] construction time, and never mutated
/// afterward: every descriptor cached by a codec is only valid for the spec values it was
/// built against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecValues {
    values: HashMap<String, u64>,
}

impl SpecValues {
    /// An empty table. Any `dynssz-*` expression will fall back to its `ssz-*` default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table from an iterator of `(name, value)` pairs.
    pub fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }

    /// Builds a table from an owned map.
    pub fn from_map(values: HashMap<String, u64>) -> Self {
        Self { values }
    }

    /// Looks up a spec value by name.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.values.get(name).copied()
    }

    /// Returns `true` if `name` is present in the table.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// A stable 64-bit fingerprint of this table's contents, used as half of the
    /// descriptor-cache key. Independent of insertion order.
    pub fn fingerprint(&self) -> u64 {
        let mut pairs: Vec<(&str, u64)> =
            self.values.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        pairs.sort_unstable_by_key(|(k, _)| *k);

        // FNV-1a over the sorted (name, value) pairs.
        const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
        const PRIME: u64 = 0x100000001b3;
        let mut hash = OFFSET_BASIS;
        let mut feed = |bytes: &[u8]| {
            for b in bytes {
                hash ^= u64::from(*b);
                hash = hash.wrapping_mul(PRIME);
            }
        };
        for (name, value) in pairs {
            feed(name.as_bytes());
            feed(&value.to_le_bytes());
        }
        hash
    }
}

impl FromIterator<(String, u64)> for SpecValues {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        SpecValues::from_iter(iter)
    }
}
