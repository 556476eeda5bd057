//! Transport module - non-blocking socket abstraction.
//!
//! The driver only needs three things from a socket: wait for readiness,
//! read without blocking, write without blocking. Those are captured by
//! [`Socket`] and [`Transmit`], implemented for tokio's:
//! - `TcpStream` (all platforms)
//! - `UnixStream` (Unix)

mod socket;

pub use socket::{connect_tcp, BoxFuture, Socket, Transmit};
pub use tokio::io::{Interest, Ready};
