//! Protocol module - line framing.
//!
//! The wire format is a sequence of text frames, each followed by a fixed
//! terminator. There is no length prefix and no escaping: a payload must
//! never contain the terminator.
//!
//! - [`LineBuffer`] splits incoming bytes into lines
//! - [`frame_line`] appends the terminator to an outgoing payload

mod line_buffer;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LinewireError, Result};

pub use line_buffer::LineBuffer;

/// Default line terminator.
pub const DEFAULT_TERMINATOR: &[u8] = b"\n";

/// Default maximum length of a partially received line (16 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Build one wire frame: `payload` followed by `terminator`.
///
/// # Errors
///
/// Returns a protocol error if the payload contains the terminator, since
/// the peer would split it into several messages.
pub fn frame_line(payload: &[u8], terminator: &[u8]) -> Result<Bytes> {
    if contains(payload, terminator) {
        return Err(LinewireError::Protocol(format!(
            "Payload of {} bytes contains the line terminator",
            payload.len()
        )));
    }

    let mut frame = BytesMut::with_capacity(payload.len() + terminator.len());
    frame.put_slice(payload);
    frame.put_slice(terminator);
    Ok(frame.freeze())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    match needle {
        [] => false,
        [byte] => haystack.contains(byte),
        _ => haystack.windows(needle.len()).any(|w| w == needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_line_appends_terminator() {
        let frame = frame_line(b"hello", b"\n").unwrap();
        assert_eq!(&frame[..], b"hello\n");

        let frame = frame_line(b"", b"\r\n").unwrap();
        assert_eq!(&frame[..], b"\r\n");
    }

    #[test]
    fn test_frame_line_rejects_embedded_terminator() {
        let err = frame_line(b"two\nlines", b"\n").unwrap_err();
        assert!(matches!(err, LinewireError::Protocol(_)));

        // A lone '\n' is fine when the terminator is "\r\n".
        assert!(frame_line(b"two\nlines", b"\r\n").is_ok());
        assert!(frame_line(b"a\r\nb", b"\r\n").is_err());
    }

    #[test]
    fn test_frame_round_trips_through_line_buffer() {
        let mut buffer = LineBuffer::new(b"\r\n");
        let mut wire = Vec::new();
        for payload in [&b"first"[..], b"", b"third"] {
            wire.extend_from_slice(&frame_line(payload, b"\r\n").unwrap());
        }

        let lines = buffer.push(&wire).unwrap();
        assert_eq!(lines, vec![&b"first"[..], &b""[..], &b"third"[..]]);
        assert!(buffer.is_empty());
    }
}
