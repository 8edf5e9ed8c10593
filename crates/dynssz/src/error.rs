//! The single error type shared by every stage of the engine.

use thiserror::Error;

/// A segment of the path accumulated as an error unwinds through nested
/// containers, sequences, and union variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named struct field.
    Field(&'static str),
    /// An index into a sequence.
    Index(usize),
    /// A selected union variant.
    Variant(u8),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Variant(v) => write!(f, "<variant {v}>"),
        }
    }
}

/// Errors produced while building descriptors, sizing, marshaling, unmarshaling, or
/// Merkleizing a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SszError {
    /// A fixed-size region did not have the expected length.
    #[error("incorrect size: got {got}, expected {expected}")]
    IncorrectSize {
        /// The actual byte length encountered.
        got: usize,
        /// The byte length required by the descriptor.
        expected: usize,
    },

    /// An offset read from the wire did not satisfy the monotonicity/bounds contract.
    #[error("incorrect offset: {offset} (limit {limit})")]
    IncorrectOffset {
        /// The offset value read.
        offset: usize,
        /// The enclosing region's byte limit at the time it was read.
        limit: usize,
    },

    /// The first offset in a variable-length region did not equal the size of the fixed
    /// prefix.
    #[error("invalid variable offset: first offset {offset}, expected fixed prefix of {expected}")]
    InvalidVariableOffset {
        /// The offset actually read.
        offset: usize,
        /// The expected fixed-prefix length.
        expected: usize,
    },

    /// A list/bitlist/vector exceeded its declared or spec-derived maximum.
    #[error("list too big: {len} exceeds maximum {max}")]
    ListTooBig {
        /// The observed length (elements or bits).
        len: usize,
        /// The maximum permitted length.
        max: usize,
    },

    /// A bitlist carried zero bytes, so no delimiter bit could be present.
    #[error("bitlist is empty, missing delimiter bit")]
    EmptyBitlist,

    /// A bitvector's unused trailing bits (beyond its declared length) were not zero.
    #[error("bitvector padding bits are not all zero")]
    BitvectorPaddingNonZero,

    /// A bitlist's trailing byte held no set bit, so the delimiter could not be located.
    #[error("bitlist is not terminated by a delimiter bit")]
    BitlistNotTerminated,

    /// A compatible union's selector did not name a known variant.
    #[error("invalid union variant selector: {0}")]
    InvalidUnionVariant(u8),

    /// The decoder ran out of bytes before the descriptor was satisfied.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A numeric value fell outside the range its type can represent.
    #[error("value {value} is out of range for this type")]
    InvalidValueRange {
        /// A human-readable rendering of the out-of-range value.
        value: String,
    },

    /// The descriptor builder encountered a type/annotation combination it does not support.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A required pointer/option target was absent where a value was mandatory.
    #[error("nil target where a value was required")]
    NilTarget,

    /// A `dynssz-*` expression referenced a spec value that is not present in the table.
    ///
    /// Not normally surfaced to callers: the tag parser falls back to the matching
    /// `ssz-*` default instead of erroring when this occurs. The variant exists for the
    /// rare case of an unresolvable expression (no `ssz-*` default to fall back to).
    #[error("spec value `{0}` is not known to this codec")]
    SpecUnknown(String),

    /// A `#[dynssz(...)]` attribute (or tag expression) could not be parsed.
    #[error("malformed annotation: {0}")]
    MalformedAnnotation(String),

    /// Bytes remained after the top-level value was fully decoded.
    #[error("{extra} trailing byte(s) after decoding")]
    TrailingBytes {
        /// The number of unconsumed bytes.
        extra: usize,
    },

    /// An error with path context recorded as it propagated upward.
    #[error("{path}: {source}")]
    WithPath {
        /// The accumulated path, outermost first.
        path: PathDisplay,
        /// The underlying error.
        #[source]
        source: Box<SszError>,
    },
}

/// A rendered path, kept as a concrete type so [`SszError`] can derive `PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDisplay(pub Vec<PathSegment>);

impl std::fmt::Display for PathDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl SszError {
    /// Prepends a path segment to this error, wrapping it in [`SszError::WithPath`] (or
    /// extending the existing path if already wrapped).
    pub fn with_path(self, segment: PathSegment) -> Self {
        match self {
            SszError::WithPath { mut path, source } => {
                path.0.insert(0, segment);
                SszError::WithPath { path, source }
            }
            other => SszError::WithPath {
                path: PathDisplay(vec![segment]),
                source: Box::new(other),
            },
        }
    }
}

/// Extension trait making it convenient to attach path context to a `Result`.
pub trait ResultExt<T> {
    /// Prepends `segment` to the error path if this result is an `Err`.
    fn context(self, segment: PathSegment) -> Result<T, SszError>;
}

impl<T> ResultExt<T> for Result<T, SszError> {
    fn context(self, segment: PathSegment) -> Result<T, SszError> {
        self.map_err(|e| e.with_path(segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_accumulates_outermost_first() {
        let err = SszError::UnexpectedEof
            .with_path(PathSegment::Index(2))
            .with_path(PathSegment::Field("items"));
        match &err {
            SszError::WithPath { path, .. } => {
                assert_eq!(path.0, vec![PathSegment::Field("items"), PathSegment::Index(2)]);
            }
            _ => panic!("expected WithPath"),
        }
        assert_eq!(err.to_string(), "$.items[2]: unexpected end of input");
    }
}
