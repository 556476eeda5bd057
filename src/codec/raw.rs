//! Raw codec - plain UTF-8 text lines.
//!
//! # Example
//!
//! ```
//! use linewire::codec::{Codec, RawCodec};
//!
//! let payload = RawCodec.encode(&"ping".to_string()).unwrap();
//! assert_eq!(payload, b"ping");
//! assert_eq!(RawCodec.decode(b"pong").unwrap(), "pong");
//! ```

use super::Codec;
use crate::error::Result;

/// Raw codec that carries text lines without transformation.
///
/// Encoding copies the string's UTF-8 bytes; decoding validates UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Message = String;

    #[inline]
    fn encode(&self, message: &String) -> Result<Vec<u8>> {
        Ok(message.as_bytes().to_vec())
    }

    #[inline]
    fn decode(&self, payload: &[u8]) -> Result<String> {
        Ok(std::str::from_utf8(payload)?.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_identity() {
        let encoded = RawCodec.encode(&"hello world".to_string()).unwrap();
        assert_eq!(encoded, b"hello world");
    }

    #[test]
    fn test_round_trip_unicode() {
        let original = "zażółć gęślą jaźń ✓".to_string();
        let encoded = RawCodec.encode(&original).unwrap();
        assert_eq!(RawCodec.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_empty() {
        let encoded = RawCodec.encode(&String::new()).unwrap();
        assert!(encoded.is_empty());
        assert_eq!(RawCodec.decode(&encoded).unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let err = RawCodec.decode(&[0x66, 0x6f, 0xff]).unwrap_err();
        assert!(err.is_decode());
    }
}
