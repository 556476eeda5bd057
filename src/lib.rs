//! # linewire
//!
//! Async client for line-delimited message streams over a single
//! point-to-point socket connection.
//!
//! This crate frames an unbounded byte stream into messages on a fixed
//! terminator, keeps a bounded history of received messages for blocking
//! consumers, fans new messages out to subscribers, and publishes outbound
//! messages with correct partial-send handling.
//!
//! ## Architecture
//!
//! - **Driver**: a future, spawned on the caller's tokio runtime, that owns
//!   the socket and performs all reads and writes
//! - **Stream**: a cloneable handle used from any thread to `publish`,
//!   `get`, `last`, `subscribe` and `close`
//! - **Codec**: [`RawCodec`] for text lines, [`JsonCodec`] for JSON values
//!
//! ## Example
//!
//! ```no_run
//! use linewire::{JsonCodec, Stream};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (stream, driver) = Stream::builder(JsonCodec::<serde_json::Value>::new())
//!         .connect("localhost", 4000)?;
//!     tokio::spawn(driver.run());
//!
//!     stream.subscribe(|msg: &serde_json::Value| {
//!         println!("received {msg}");
//!     });
//!     stream.publish(&json!({"cmd": "start"}))?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     stream.close();
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod inbound;
pub mod protocol;
pub mod transport;
pub mod writer;

mod stream;

pub use codec::{Codec, JsonCodec, RawCodec};
pub use error::{LinewireError, Result};
pub use handler::{Subscriber, SubscriptionId};
pub use stream::{
    ConnectionState, Driver, Stream, StreamBuilder, StreamConfig, DEFAULT_CAPACITY, DEFAULT_HOST,
    DEFAULT_PORT, DEFAULT_READ_BUFFER_SIZE,
};
