//! JSON codec using `serde_json`.
//!
//! Messages are serialized with `serde_json::to_vec`, which produces compact
//! single-line output: newlines inside strings are escaped, so the default
//! `\n` terminator can never appear inside an encoded payload.
//!
//! # Example
//!
//! ```
//! use linewire::codec::{Codec, JsonCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Pose {
//!     x: f64,
//!     y: f64,
//! }
//!
//! let codec = JsonCodec::<Pose>::new();
//! let pose = Pose { x: 1.0, y: -2.5 };
//! let encoded = codec.encode(&pose).unwrap();
//! assert_eq!(codec.decode(&encoded).unwrap(), pose);
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;

/// JSON codec for structured messages.
///
/// Defaults to [`serde_json::Value`] so untyped streams work out of the box.
pub struct JsonCodec<T = serde_json::Value> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a new JSON codec.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("message", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Message = T;

    #[inline]
    fn encode(&self, message: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    #[inline]
    fn decode(&self, payload: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Inner {
        value: i32,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Outer {
        name: String,
        inner: Inner,
        items: Vec<Option<f64>>,
    }

    #[test]
    fn test_round_trip_nested_struct() {
        let codec = JsonCodec::<Outer>::new();
        let original = Outer {
            name: "robot".to_string(),
            inner: Inner { value: -7 },
            items: vec![Some(0.5), None, Some(3.0)],
        };

        let encoded = codec.encode(&original).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_round_trip_untyped_value() {
        let codec = JsonCodec::<Value>::new();
        let original = json!({
            "pose": {"x": 1.0, "y": [1, 2, {"z": null}]},
            "ok": true,
            "tags": ["a", "b"]
        });

        let encoded = codec.encode(&original).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn test_encoded_payload_is_single_line() {
        let codec = JsonCodec::<Value>::new();
        let encoded = codec.encode(&json!({"text": "line one\nline two"})).unwrap();
        assert!(!encoded.contains(&b'\n'));
    }

    #[test]
    fn test_malformed_is_decode_error() {
        let codec = JsonCodec::<Value>::new();
        let err = codec.decode(b"{\"unterminated\": ").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let codec = JsonCodec::<Inner>::new();
        let err = codec.decode(b"[1, 2, 3]").unwrap_err();
        assert!(err.is_decode());
    }
}
