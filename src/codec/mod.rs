//! Codec module - conversion between message values and line payloads.
//!
//! This module provides the codecs a [`Stream`](crate::Stream) can be built with:
//!
//! - [`RawCodec`] - UTF-8 text, passed through unchanged
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Design
//!
//! Codecs are selected once, at stream construction, and shared by the
//! driver and every consumer handle. Payloads never include the
//! terminator: framing is applied by [`frame_line`](crate::protocol::frame_line)
//! on the way out and stripped by [`LineBuffer`](crate::protocol::LineBuffer)
//! on the way in.
//!
//! # Example
//!
//! ```
//! use linewire::codec::{Codec, JsonCodec, RawCodec};
//! use serde_json::json;
//!
//! let raw = RawCodec;
//! let payload = raw.encode(&"hello".to_string()).unwrap();
//! assert_eq!(raw.decode(&payload).unwrap(), "hello");
//!
//! let codec = JsonCodec::<serde_json::Value>::new();
//! let payload = codec.encode(&json!({"speed": 1.5})).unwrap();
//! assert_eq!(codec.decode(&payload).unwrap()["speed"], 1.5);
//! ```

mod json;
mod raw;

pub use json::JsonCodec;
pub use raw::RawCodec;

use crate::error::Result;

/// Encode/decode strategy for the messages carried by a stream.
///
/// `decode` is called at most once per received message for subscriber
/// fan-out, and once per `get`/`last` call.
pub trait Codec: Send + Sync + 'static {
    /// The domain value carried by one line.
    type Message: Send + 'static;

    /// Encode a message into a payload (without terminator).
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>>;

    /// Decode a payload (terminator already stripped) into a message.
    ///
    /// # Errors
    ///
    /// Returns a decode error (see [`LinewireError::is_decode`](crate::LinewireError::is_decode))
    /// if the payload is malformed.
    fn decode(&self, payload: &[u8]) -> Result<Self::Message>;
}
