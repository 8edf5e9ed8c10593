//! The decoder abstraction: a cursor over a byte slice with a stack of nested region limits.
//!
//! Grounded on the offset-validation rules this engine's ancestor used for its zero-copy
//! container views (first offset must equal the fixed prefix, offsets must be
//! non-decreasing, offsets must stay in bounds) — generalized here into a push/pop limit
//! stack so the same rules apply uniformly to containers, dynamic vectors, and dynamic
//! lists instead of being reimplemented per shape.

use crate::error::SszError;

/// A decoding cursor over an in-memory byte slice.
///
/// Every `decode_*` method both advances the position and checks the read stays within the
/// innermost pushed limit (or the whole buffer, if no limit is pushed).
#[derive(Debug)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    position: usize,
    limits: Vec<usize>,
}

impl<'a> Decoder<'a> {
    /// Wraps a byte slice for decoding.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            limits: Vec::new(),
        }
    }

    /// The current read position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The byte offset one past the end of the innermost active region.
    pub fn limit(&self) -> usize {
        *self.limits.last().unwrap_or(&self.bytes.len())
    }

    /// The number of bytes left before the innermost active region's limit.
    pub fn remaining(&self) -> usize {
        self.limit() - self.position
    }

    /// Pushes a new limit `n` bytes past the current position.
    ///
    /// Fails if that would exceed the enclosing limit.
    pub fn push_limit(&mut self, n: usize) -> Result<(), SszError> {
        let new_limit = self.position + n;
        if new_limit > self.limit() {
            return Err(SszError::IncorrectOffset {
                offset: new_limit,
                limit: self.limit(),
            });
        }
        self.limits.push(new_limit);
        Ok(())
    }

    /// Pushes a limit set to an absolute byte position (used when a region's end is known
    /// from an offset table rather than a length).
    pub fn push_limit_at(&mut self, absolute: usize) -> Result<(), SszError> {
        if absolute > self.limit() || absolute < self.position {
            return Err(SszError::IncorrectOffset {
                offset: absolute,
                limit: self.limit(),
            });
        }
        self.limits.push(absolute);
        Ok(())
    }

    /// Pops the innermost limit, returning the number of bytes left unconsumed within it.
    pub fn pop_limit(&mut self) -> usize {
        let limit = self.limits.pop().unwrap_or(self.bytes.len());
        limit - self.position
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SszError> {
        if self.position + n > self.limit() {
            return Err(SszError::UnexpectedEof);
        }
        let slice = &self.bytes[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    /// Reads a `bool` (`0x00` or `0x01`; any other byte is out of range).
    pub fn decode_bool(&mut self) -> Result<bool, SszError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SszError::InvalidValueRange {
                value: format!("{other:#04x} is not a valid bool"),
            }),
        }
    }

    /// Reads a little-endian `u8`.
    pub fn decode_u8(&mut self) -> Result<u8, SszError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn decode_u16(&mut self) -> Result<u16, SszError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("exactly 2 bytes")))
    }

    /// Reads a little-endian `u32`.
    pub fn decode_u32(&mut self) -> Result<u32, SszError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("exactly 4 bytes")))
    }

    /// Reads a little-endian `u64`.
    pub fn decode_u64(&mut self) -> Result<u64, SszError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("exactly 8 bytes")))
    }

    /// Reads exactly `n` raw bytes.
    pub fn decode_bytes(&mut self, n: usize) -> Result<&'a [u8], SszError> {
        self.take(n)
    }

    /// Reads a 4-byte little-endian offset.
    pub fn decode_offset(&mut self) -> Result<usize, SszError> {
        Ok(self.decode_u32()? as usize)
    }

    /// Reads the remaining bytes in the innermost active region without consuming a
    /// specific count up front.
    pub fn decode_rest(&mut self) -> Result<&'a [u8], SszError> {
        let n = self.remaining();
        self.take(n)
    }

    /// Returns `true` if the decoder is exactly at its outermost limit (no trailing bytes).
    pub fn at_end(&self) -> bool {
        self.position == self.bytes.len() && self.limits.is_empty()
    }
}

/// Validates an offset read from a fixed prefix/offset table: the first offset must equal
/// `fixed_portion_size` exactly, and every offset must be within `[prev, container_len]`
/// (non-decreasing, in bounds).
pub fn validate_offset(
    offset: usize,
    is_first: bool,
    fixed_portion_size: usize,
    prev_offset: Option<usize>,
    container_len: usize,
) -> Result<(), SszError> {
    if is_first && offset != fixed_portion_size {
        return Err(SszError::InvalidVariableOffset {
            offset,
            expected: fixed_portion_size,
        });
    }
    if let Some(prev) = prev_offset
        && offset < prev
    {
        return Err(SszError::IncorrectOffset {
            offset,
            limit: container_len,
        });
    }
    if offset > container_len {
        return Err(SszError::IncorrectOffset {
            offset,
            limit: container_len,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_primitives_little_endian() {
        let bytes = [0x39, 0x05];
        let mut d = Decoder::new(&bytes);
        assert_eq!(d.decode_u16().unwrap(), 1337);
        assert!(d.at_end());
    }

    #[test]
    fn limit_stack_bounds_reads() {
        let bytes = [1, 2, 3, 4, 5, 6];
        let mut d = Decoder::new(&bytes);
        d.push_limit(3).unwrap();
        assert_eq!(d.decode_u8().unwrap(), 1);
        assert_eq!(d.decode_u8().unwrap(), 2);
        assert_eq!(d.decode_u8().unwrap(), 3);
        assert!(d.decode_u8().is_err());
        assert_eq!(d.pop_limit(), 0);
        assert_eq!(d.decode_u8().unwrap(), 4);
    }

    #[test]
    fn first_offset_must_equal_fixed_prefix() {
        assert!(validate_offset(5, true, 5, None, 10).is_ok());
        assert!(validate_offset(3, true, 5, None, 10).is_err());
    }

    #[test]
    fn offsets_must_be_non_decreasing_and_in_bounds() {
        assert!(validate_offset(8, false, 5, Some(5), 10).is_ok());
        assert!(validate_offset(4, false, 5, Some(5), 10).is_err());
        assert!(validate_offset(11, false, 5, Some(5), 10).is_err());
    }
}
