//! Delimiter-based message fragmentation.
//!
//! This module provides the outbound frame encoder and the incremental
//! inbound decoder. Both sides share the same two parameters chosen at
//! session construction: the delimiter byte and the maximum message length.

use crate::error::FramingError;
use bytes::{Buf, Bytes, BytesMut};

/// Encode one outbound message by appending the delimiter byte.
///
/// The message is validated before any allocation: it must not contain the
/// delimiter and must not exceed `max_len`. A rejected message produces zero
/// bytes on the wire.
pub fn encode_frame(payload: &[u8], delimiter: u8, max_len: usize) -> Result<Bytes, FramingError> {
    if payload.len() > max_len {
        return Err(FramingError::TooLong {
            len: payload.len(),
            max: max_len,
        });
    }
    if payload.contains(&delimiter) {
        return Err(FramingError::DelimiterInPayload(delimiter));
    }

    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&[delimiter]);
    Ok(buf.freeze())
}

/// Incremental decoder for delimiter-framed byte streams.
///
/// Byte chunks are appended with [`extend`](Self::extend) and complete frames
/// are pulled with [`decode`](Self::decode) until it returns `Ok(None)`.
#[derive(Debug)]
pub struct FrameDecoder {
    delimiter: u8,
    max_len: usize,
    buf: BytesMut,
    /// Set while discarding an oversized run; bytes are dropped until the
    /// next delimiter closes the poisoned frame.
    skipping: bool,
}

impl FrameDecoder {
    /// Create a new decoder for the given delimiter and maximum frame length.
    pub fn new(delimiter: u8, max_len: usize) -> Self {
        Self {
            delimiter,
            max_len,
            buf: BytesMut::with_capacity(4 * 1024),
            skipping: false,
        }
    }

    /// Append a received chunk to the accumulation buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` once no complete frame remains. An oversized run is
    /// discarded whole and reported as [`FramingError::Overflow`]; decoding
    /// resumes with the bytes following its closing delimiter.
    pub fn decode(&mut self) -> Result<Option<Bytes>, FramingError> {
        if self.skipping {
            match self.find_delimiter() {
                Some(pos) => {
                    self.buf.advance(pos + 1);
                    self.skipping = false;
                }
                None => {
                    self.buf.clear();
                    return Ok(None);
                }
            }
        }

        match self.find_delimiter() {
            Some(pos) if pos > self.max_len => {
                // Oversized but already closed; drop it and its delimiter.
                self.buf.advance(pos + 1);
                Err(FramingError::Overflow { max: self.max_len })
            }
            Some(pos) => {
                let frame = self.buf.split_to(pos).freeze();
                self.buf.advance(1);
                Ok(Some(frame))
            }
            None if self.buf.len() > self.max_len => {
                // No delimiter in sight and the run is already too long.
                self.buf.clear();
                self.skipping = true;
                Err(FramingError::Overflow { max: self.max_len })
            }
            None => Ok(None),
        }
    }

    fn find_delimiter(&self) -> Option<usize> {
        self.buf.iter().position(|&b| b == self.delimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 64;

    #[test]
    fn test_encode_appends_delimiter() {
        let frame = encode_frame(b"hello", b'\n', MAX).unwrap();
        assert_eq!(&frame[..], b"hello\n");
    }

    #[test]
    fn test_encode_rejects_delimiter_in_payload() {
        let err = encode_frame(b"hel\nlo", b'\n', MAX).unwrap_err();
        assert_eq!(err, FramingError::DelimiterInPayload(b'\n'));
    }

    #[test]
    fn test_encode_rejects_too_long() {
        let payload = vec![b'x'; MAX + 1];
        let err = encode_frame(&payload, b'\n', MAX).unwrap_err();
        assert_eq!(
            err,
            FramingError::TooLong {
                len: MAX + 1,
                max: MAX
            }
        );
    }

    #[test]
    fn test_roundtrip_single_frame() {
        let frame = encode_frame(b"hello", b'\n', MAX).unwrap();
        let mut decoder = FrameDecoder::new(b'\n', MAX);
        decoder.extend(&frame);
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_three_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new(b'\n', MAX);
        decoder.extend(b"a\nbb\nccc\n");

        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"a"));
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"bb"));
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"ccc"));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new(b'\n', MAX);
        decoder.extend(b"hel");
        assert_eq!(decoder.decode().unwrap(), None);

        decoder.extend(b"lo\nwor");
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(decoder.decode().unwrap(), None);

        decoder.extend(b"ld\n");
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"world"));
    }

    #[test]
    fn test_empty_frame() {
        let mut decoder = FrameDecoder::new(b'\n', MAX);
        decoder.extend(b"\nx\n");
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::new());
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn test_oversized_closed_frame_discarded() {
        let mut decoder = FrameDecoder::new(b'\n', 4);
        decoder.extend(b"toolong\nok\n");

        assert_eq!(decoder.decode().unwrap_err(), FramingError::Overflow { max: 4 });
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"ok"));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_overflow_without_delimiter_resumes_after_next() {
        let mut decoder = FrameDecoder::new(b'\n', 4);

        // First chunk overflows without ever seeing a delimiter.
        decoder.extend(b"aaaaaaaa");
        assert_eq!(decoder.decode().unwrap_err(), FramingError::Overflow { max: 4 });
        assert_eq!(decoder.decode().unwrap(), None);

        // Tail of the poisoned frame keeps being dropped.
        decoder.extend(b"aaaa");
        assert_eq!(decoder.decode().unwrap(), None);

        // Delimiter ends the poisoned frame; the next frame is intact.
        decoder.extend(b"a\nok\n");
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from_static(b"ok"));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_frame_of_exactly_max_len_accepted() {
        let payload = vec![b'x'; 4];
        let mut decoder = FrameDecoder::new(b'\n', 4);
        decoder.extend(&payload);
        decoder.extend(b"\n");
        assert_eq!(decoder.decode().unwrap().unwrap(), Bytes::from(payload));
    }
}
