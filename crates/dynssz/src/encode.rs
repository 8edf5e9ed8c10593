//! Encoder abstractions: a seekable, buffered encoder that can back-patch offsets, and a
//! forward-only streaming encoder that cannot.

use crate::error::SszError;

/// A sink the marshal dispatcher writes encoded bytes into.
pub trait Encoder {
    /// The current write position, in bytes from the start of the top-level value.
    fn position(&self) -> usize;

    /// `true` if [`Encoder::patch_offset_at`] is supported.
    fn seekable(&self) -> bool;

    /// Appends raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError>;

    /// Appends `n` zero bytes.
    fn write_zero_padding(&mut self, n: usize) -> Result<(), SszError> {
        // SmallVec-backed encoders can do better than a naive loop, but this default is
        // correct for any encoder and is only ever used for small amounts of padding.
        const ZEROES: [u8; 64] = [0; 64];
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(ZEROES.len());
            self.write_bytes(&ZEROES[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Appends a 4-byte little-endian offset.
    fn write_offset(&mut self, offset: u32) -> Result<(), SszError> {
        self.write_bytes(&offset.to_le_bytes())
    }

    /// Rewrites the 4-byte little-endian offset already written at `pos`.
    ///
    /// Only valid when [`Encoder::seekable`] is `true`.
    fn patch_offset_at(&mut self, pos: usize, offset: u32) -> Result<(), SszError>;
}

/// A buffered, seekable [`Encoder`] backed by an in-memory `Vec<u8>`.
///
/// Offset placeholders are written as `0u32` and back-patched once the referenced body's
/// final position is known.
#[derive(Debug, Default)]
pub struct BufferEncoder {
    buf: Vec<u8>,
}

impl BufferEncoder {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing buffer (e.g. one drawn from a [`crate::hash::HasherPool`]), writing
    /// from its current length rather than starting over.
    pub fn with_buffer(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// Consumes this encoder, returning its accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Borrows the bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Encoder for BufferEncoder {
    fn position(&self) -> usize {
        self.buf.len()
    }

    fn seekable(&self) -> bool {
        true
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn patch_offset_at(&mut self, pos: usize, offset: u32) -> Result<(), SszError> {
        self.buf[pos..pos + 4].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }
}

/// A forward-only [`Encoder`] that writes directly into a caller-provided sink as bytes are
/// produced.
///
/// Because it cannot seek, the marshal dispatcher must consult [`crate::size::value_size`]'s
/// size tree ahead of writing a container's offset table, rather than writing placeholders
/// and patching them later.
pub struct StreamEncoder<'a> {
    sink: &'a mut dyn std::io::Write,
    position: usize,
}

impl<'a> StreamEncoder<'a> {
    /// Wraps a writable sink.
    pub fn new(sink: &'a mut dyn std::io::Write) -> Self {
        Self { sink, position: 0 }
    }
}

impl Encoder for StreamEncoder<'_> {
    fn position(&self) -> usize {
        self.position
    }

    fn seekable(&self) -> bool {
        false
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SszError> {
        self.sink
            .write_all(bytes)
            .map_err(|e| SszError::UnsupportedType(format!("stream write failed: {e}")))?;
        self.position += bytes.len();
        Ok(())
    }

    fn patch_offset_at(&mut self, _pos: usize, _offset: u32) -> Result<(), SszError> {
        Err(SszError::UnsupportedType(
            "cannot patch an offset on a forward-only stream".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_encoder_patches_offsets() {
        let mut enc = BufferEncoder::new();
        enc.write_offset(0).unwrap();
        enc.write_bytes(b"hello").unwrap();
        enc.patch_offset_at(0, 4).unwrap();
        assert_eq!(&enc.into_bytes(), &[4, 0, 0, 0, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn stream_encoder_cannot_patch() {
        let mut out = Vec::new();
        let mut enc = StreamEncoder::new(&mut out);
        assert!(!enc.seekable());
        enc.write_bytes(b"x").unwrap();
        assert!(enc.patch_offset_at(0, 1).is_err());
        assert_eq!(out, b"x");
    }
}
