//! Frame extraction for the delimiter-based wire protocol.
//!
//! Requests and responses are byte spans terminated by a fixed four-byte
//! delimiter. Incoming bytes accumulate in a per-connection `BytesMut` and
//! `extract_frame` splits complete frames off the front as they appear,
//! independent of how the stream was segmented into reads: a frame may
//! arrive in one read, across many, or packed together with its neighbors.

use bytes::{Buf, Bytes, BytesMut};

/// Frame delimiter for both requests and responses.
pub const DELIMITER: &[u8] = b"\r\n\r\n";

/// Split the first complete frame off the front of `buffer`.
///
/// Returns the frame without its delimiter and leaves the remainder, which
/// may already contain further complete frames, in place. Returns `None`
/// when no delimiter has arrived yet.
pub fn extract_frame(buffer: &mut BytesMut) -> Option<BytesMut> {
    let at = find_delimiter(buffer)?;
    let frame = buffer.split_to(at);
    buffer.advance(DELIMITER.len());
    Some(frame)
}

/// Position of the first delimiter occurrence, if any.
fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

/// Whether a frame holds nothing but whitespace.
///
/// Blank frames are a keep-alive artifact of some clients and are dropped
/// without a response or a counter update.
pub fn is_blank(frame: &[u8]) -> bool {
    frame.iter().all(u8::is_ascii_whitespace)
}

/// Encode one response payload as a delimited wire frame.
pub fn encode_frame(payload: &str) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + DELIMITER.len());
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(DELIMITER);
    out.freeze()
}
