//! Error types for linewire.

use thiserror::Error;

use crate::handler::SubscriptionId;

/// Main error type for all linewire operations.
#[derive(Debug, Error)]
pub enum LinewireError {
    /// I/O error on the underlying socket. Terminal for the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Received payload is not valid UTF-8.
    #[error("UTF-8 decode error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Protocol error (line too long, terminator inside a payload, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid stream configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `unsubscribe` called with an id that is not registered.
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(SubscriptionId),

    /// Connection closed (locally, by the peer, or after an I/O error).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl LinewireError {
    /// Whether this error came from decoding a received payload.
    ///
    /// Decode errors never close the connection.
    pub fn is_decode(&self) -> bool {
        matches!(self, LinewireError::Json(_) | LinewireError::Utf8(_))
    }
}

/// Result type alias using LinewireError.
pub type Result<T> = std::result::Result<T, LinewireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_classification() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(LinewireError::from(json).is_decode());

        let bytes = [0xffu8, 0xfe];
        let utf8 = std::str::from_utf8(&bytes).unwrap_err();
        assert!(LinewireError::from(utf8).is_decode());

        assert!(!LinewireError::ConnectionClosed.is_decode());
        assert!(!LinewireError::Protocol("x".into()).is_decode());
    }

    #[test]
    fn test_display() {
        let err = LinewireError::SubscriberNotFound(SubscriptionId::from_raw(7));
        assert_eq!(err.to_string(), "Subscriber not found: #7");
    }
}
