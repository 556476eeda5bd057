//! Socket traits and their tokio implementations.
//!
//! # Example
//!
//! ```ignore
//! use linewire::transport::{connect_tcp, Interest, Socket};
//!
//! let socket = connect_tcp("localhost".into(), 1234).await?;
//! let ready = socket.ready(Interest::READABLE).await?;
//! ```

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;

/// Boxed future returned by socket readiness checks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Non-blocking send half of a socket.
pub trait Transmit {
    /// Send as much of `buf` as the socket accepts right now.
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing can be sent.
    fn try_send(&self, buf: &[u8]) -> io::Result<usize>;
}

/// A connected, non-blocking stream socket.
pub trait Socket: Transmit + Send + Sync + 'static {
    /// Wait until the socket is ready for any of `interest`.
    ///
    /// Readiness may be spurious: the following `try_recv`/`try_send` can
    /// still report `WouldBlock`.
    fn ready(&self, interest: Interest) -> BoxFuture<'_, io::Result<Ready>>;

    /// Receive into `buf` without blocking. `Ok(0)` means the peer closed.
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Transmit for TcpStream {
    #[inline]
    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }
}

impl Socket for TcpStream {
    fn ready(&self, interest: Interest) -> BoxFuture<'_, io::Result<Ready>> {
        Box::pin(TcpStream::ready(self, interest))
    }

    #[inline]
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use tokio::net::UnixStream;

    impl Transmit for UnixStream {
        #[inline]
        fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
            self.try_write(buf)
        }
    }

    impl Socket for UnixStream {
        fn ready(&self, interest: Interest) -> BoxFuture<'_, io::Result<Ready>> {
            Box::pin(UnixStream::ready(self, interest))
        }

        #[inline]
        fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            self.try_read(buf)
        }
    }
}

/// Open a TCP connection to `host:port` with Nagle's algorithm disabled.
pub async fn connect_tcp(host: String, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host.as_str(), port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_socket_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, accepted) =
            tokio::join!(connect_tcp("127.0.0.1".into(), port), listener.accept());
        let client = client.unwrap();
        let (mut server, _) = accepted.unwrap();

        server.write_all(b"ping\n").await.unwrap();

        let ready = Socket::ready(&client, Interest::READABLE).await.unwrap();
        assert!(ready.is_readable());

        let mut buf = [0u8; 16];
        let n = loop {
            match client.try_recv(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    Socket::ready(&client, Interest::READABLE).await.unwrap();
                }
                Err(e) => panic!("read failed: {e}"),
            }
        };
        assert_eq!(&buf[..n], b"ping\n");

        let ready = Socket::ready(&client, Interest::WRITABLE).await.unwrap();
        assert!(ready.is_writable());
        assert_eq!(client.try_send(b"pong\n").unwrap(), 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_socket_pair() {
        let (a, b) = tokio::net::UnixStream::pair().unwrap();

        Socket::ready(&a, Interest::WRITABLE).await.unwrap();
        assert_eq!(a.try_send(b"hi").unwrap(), 2);

        Socket::ready(&b, Interest::READABLE).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(b.try_recv(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"hi");
    }
}
