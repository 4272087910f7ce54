//! Newline frame codec.
//!
//! One frame on the wire is one compact JSON document followed by a single
//! `\n`. The codec does not look inside frames; it only finds boundaries.

use bytes::{Bytes, BytesMut};
use memchr::memchr;

use crate::TransportError;

/// Splits a byte stream into `\n`-terminated frames.
///
/// The codec owns a persistent buffer: bytes that do not yet form a
/// complete frame stay buffered until the next [`feed`](Self::feed). A
/// single TCP read may carry less than one frame or several, so one codec
/// must live exactly as long as its connection.
///
/// ```rust
/// use rookery_transport::FrameCodec;
///
/// let mut codec = FrameCodec::new();
/// assert!(codec.decode(b"{\"a\":").unwrap().is_empty());
/// let frames = codec.decode(b"1}\n{\"b\":2}\n{\"c\"").unwrap();
/// assert_eq!(frames.len(), 2);
/// assert_eq!(&frames[0][..], b"{\"a\":1}");
/// assert_eq!(codec.remaining(), 4);
/// ```
#[derive(Debug)]
pub struct FrameCodec {
    buf: BytesMut,
    /// Leading bytes of `buf` already searched without finding `\n`.
    scanned: usize,
    max_frame_len: usize,
}

impl FrameCodec {
    /// Default upper bound for a single frame.
    pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

    /// Creates a codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(Self::DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a codec that rejects frames longer than `max` bytes.
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * 1024),
            scanned: 0,
            max_frame_len: max.max(1),
        }
    }

    /// Returns the configured frame limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Appends raw bytes read from the socket.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pops the next complete frame, without its delimiter.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped. Returns
    /// `Ok(None)` when only a partial frame (or nothing) is buffered.
    ///
    /// # Errors
    /// [`TransportError::FrameTooLong`] when the buffered remainder or a
    /// complete line exceeds the frame limit. The stream cannot be
    /// resynchronized after that; the caller should drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            let Some(offset) = memchr(b'\n', &self.buf[self.scanned..]) else {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_frame_len {
                    return Err(TransportError::FrameTooLong {
                        len: self.buf.len(),
                        max: self.max_frame_len,
                    });
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            let line = self.buf.split_to(end + 1).freeze();
            self.scanned = 0;

            let frame = trim_line(line);
            if frame.is_empty() {
                continue;
            }
            if frame.len() > self.max_frame_len {
                return Err(TransportError::FrameTooLong {
                    len: frame.len(),
                    max: self.max_frame_len,
                });
            }
            return Ok(Some(frame));
        }
    }

    /// Feeds `chunk` and drains every frame it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, TransportError> {
        self.feed(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Appends `frame` plus the delimiter to `dst`.
    ///
    /// # Errors
    /// [`TransportError::InvalidFrame`] if `frame` is empty or contains a
    /// `\n`, which would split it in two on the receiving side.
    pub fn encode(frame: &[u8], dst: &mut BytesMut) -> Result<(), TransportError> {
        if frame.is_empty() {
            return Err(TransportError::InvalidFrame("empty frame".into()));
        }
        if memchr(b'\n', frame).is_some() {
            return Err(TransportError::InvalidFrame(
                "frame contains an embedded newline".into(),
            ));
        }
        dst.reserve(frame.len() + 1);
        dst.extend_from_slice(frame);
        dst.extend_from_slice(b"\n");
        Ok(())
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(mut line: Bytes) -> Bytes {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    line.truncate(end);
    line
}

#[cfg(test)]
mod tests {
    //! The codec's one job is to get boundaries right no matter how the
    //! kernel slices the stream, so most tests here split the same input in
    //! different places and check the output never changes.

    use super::*;

    fn frames_of(out: &[Bytes]) -> Vec<&[u8]> {
        out.iter().map(|b| &b[..]).collect()
    }

    const STREAM: &[u8] =
        b"{\"messageType\":\"AUTH_LOGIN_REQ\"}\n{\"messageType\":\"LOBBY_LIST\"}\n{\"x\":[1,2]}\n";

    fn expected() -> Vec<&'static [u8]> {
        vec![
            b"{\"messageType\":\"AUTH_LOGIN_REQ\"}",
            b"{\"messageType\":\"LOBBY_LIST\"}",
            b"{\"x\":[1,2]}",
        ]
    }

    #[test]
    fn test_decode_single_chunk_yields_all_frames() {
        let mut codec = FrameCodec::new();
        let out = codec.decode(STREAM).unwrap();
        assert_eq!(frames_of(&out), expected());
        assert!(codec.is_empty());
    }

    #[test]
    fn test_decode_every_two_way_split_reconstructs_frames() {
        for split in 0..=STREAM.len() {
            let mut codec = FrameCodec::new();
            let mut out = codec.decode(&STREAM[..split]).unwrap();
            out.extend(codec.decode(&STREAM[split..]).unwrap());
            assert_eq!(frames_of(&out), expected(), "split at {split}");
            assert!(codec.is_empty(), "split at {split}");
        }
    }

    #[test]
    fn test_decode_every_three_way_split_reconstructs_frames() {
        for a in 0..=STREAM.len() {
            for b in a..=STREAM.len() {
                let mut codec = FrameCodec::new();
                let mut out = codec.decode(&STREAM[..a]).unwrap();
                out.extend(codec.decode(&STREAM[a..b]).unwrap());
                out.extend(codec.decode(&STREAM[b..]).unwrap());
                assert_eq!(frames_of(&out), expected(), "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn test_decode_byte_at_a_time_reconstructs_frames() {
        let mut codec = FrameCodec::new();
        let mut out = Vec::new();
        for byte in STREAM {
            out.extend(codec.decode(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(frames_of(&out), expected());
    }

    #[test]
    fn test_decode_partial_remainder_is_kept_not_error() {
        let mut codec = FrameCodec::new();
        let out = codec.decode(b"{\"a\":1}\n{\"b\"").unwrap();
        assert_eq!(frames_of(&out), vec![&b"{\"a\":1}"[..]]);
        assert_eq!(codec.remaining(), 4);

        let out = codec.decode(b":2}\n").unwrap();
        assert_eq!(frames_of(&out), vec![&b"{\"b\":2}"[..]]);
        assert_eq!(codec.remaining(), 0);
    }

    #[test]
    fn test_next_frame_strips_crlf() {
        let mut codec = FrameCodec::new();
        let out = codec.decode(b"{}\r\n{\"a\":1}\n").unwrap();
        assert_eq!(frames_of(&out), vec![&b"{}"[..], &b"{\"a\":1}"[..]]);
    }

    #[test]
    fn test_next_frame_skips_blank_lines() {
        let mut codec = FrameCodec::new();
        let out = codec.decode(b"\n\r\n{}\n\n").unwrap();
        assert_eq!(frames_of(&out), vec![&b"{}"[..]]);
    }

    #[test]
    fn test_next_frame_unterminated_overflow_is_error() {
        let mut codec = FrameCodec::with_max_frame_len(8);
        assert!(codec.decode(b"12345678").unwrap().is_empty());
        let err = codec.decode(b"9").unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLong { len: 9, max: 8 }));
    }

    #[test]
    fn test_next_frame_terminated_overlong_line_is_error() {
        let mut codec = FrameCodec::with_max_frame_len(4);
        let err = codec.decode(b"123456\n").unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLong { .. }));
    }

    #[test]
    fn test_next_frame_frame_at_exact_limit_is_accepted() {
        let mut codec = FrameCodec::with_max_frame_len(4);
        let out = codec.decode(b"abcd\n").unwrap();
        assert_eq!(frames_of(&out), vec![&b"abcd"[..]]);
    }

    #[test]
    fn test_encode_appends_single_delimiter() {
        let mut dst = BytesMut::new();
        FrameCodec::encode(b"{\"a\":1}", &mut dst).unwrap();
        FrameCodec::encode(b"{}", &mut dst).unwrap();
        assert_eq!(&dst[..], b"{\"a\":1}\n{}\n");
    }

    #[test]
    fn test_encode_embedded_newline_is_rejected() {
        let mut dst = BytesMut::new();
        let err = FrameCodec::encode(b"{\"a\":\n1}", &mut dst).unwrap_err();
        assert!(matches!(err, TransportError::InvalidFrame(_)));
        assert!(dst.is_empty(), "nothing may be written for a bad frame");
    }

    #[test]
    fn test_encode_then_decode_preserves_frames() {
        let mut wire = BytesMut::new();
        for frame in expected() {
            FrameCodec::encode(frame, &mut wire).unwrap();
        }
        assert_eq!(&wire[..], STREAM);
    }
}
