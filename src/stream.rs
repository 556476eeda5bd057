//! Stream handle, builder and I/O driver.
//!
//! The [`StreamBuilder`] configures a stream and produces two halves:
//! - [`Stream`] - cloneable handle for consumer threads (`publish`, `get`,
//!   `last`, `subscribe`, ...)
//! - [`Driver`] - future that owns the socket and performs all I/O; the
//!   caller spawns it on its own tokio runtime
//!
//! The driver waits for socket readiness. Readable data is split into
//! lines; each line is pushed to the inbound history (waking blocked
//! `get` callers) and then decoded once for the subscribers. When the
//! socket is writable, the outbound queue performs one send.
//!
//! # Example
//!
//! ```no_run
//! use linewire::{RawCodec, Stream};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (stream, driver) = Stream::builder(RawCodec)
//!         .capacity(10)
//!         .connect("localhost", 1234)?;
//!     tokio::spawn(driver.run());
//!
//!     stream.subscribe(|line: &String| println!("<< {line}"));
//!     stream.publish(&"hello".to_string())?;
//!
//!     let reply = tokio::task::spawn_blocking({
//!         let stream = stream.clone();
//!         move || stream.get(Some(Duration::from_secs(1)))
//!     })
//!     .await??;
//!     println!("reply: {reply:?}");
//!
//!     stream.close();
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tracing::Instrument;

use crate::codec::Codec;
use crate::error::{LinewireError, Result};
use crate::handler::{Subscriber, SubscriberRegistry, SubscriptionId};
use crate::inbound::{InboundQueue, Wait};
use crate::protocol::{frame_line, LineBuffer, DEFAULT_MAX_LINE_LENGTH, DEFAULT_TERMINATOR};
use crate::transport::{connect_tcp, BoxFuture, Interest, Socket};
use crate::writer::{DrainOutcome, Outbound, OutboundQueue, DEFAULT_MAX_SEND_CHUNK};

/// Default host for [`StreamBuilder::connect_default`].
pub const DEFAULT_HOST: &str = "localhost";

/// Default port for [`StreamBuilder::connect_default`].
pub const DEFAULT_PORT: u16 = 1234;

/// Default number of received lines kept for `get`/`last`.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for a stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum number of received lines kept; the oldest is evicted first.
    pub capacity: usize,
    /// Line terminator. Must not be empty.
    pub terminator: Bytes,
    /// Maximum bytes handed to the socket in one send.
    pub max_send_chunk: usize,
    /// Size of the buffer used for each socket read.
    pub read_buffer_size: usize,
    /// Maximum length of a partially received line.
    pub max_line_length: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            terminator: Bytes::from_static(DEFAULT_TERMINATOR),
            max_send_chunk: DEFAULT_MAX_SEND_CHUNK,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl StreamConfig {
    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a zero capacity, an empty terminator, or a zero
    /// chunk, read buffer or line length.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(LinewireError::Config("capacity must be at least 1".into()));
        }
        if self.terminator.is_empty() {
            return Err(LinewireError::Config("terminator must not be empty".into()));
        }
        if self.max_send_chunk == 0 {
            return Err(LinewireError::Config(
                "max_send_chunk must be at least 1".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(LinewireError::Config(
                "read_buffer_size must be at least 1".into(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(LinewireError::Config(
                "max_line_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The driver is still establishing the connection.
    Connecting,
    /// Connected; I/O in progress.
    Connected,
    /// Closed locally, by the peer, or after an error. Final.
    Closed,
}

/// State shared by the stream handles and the driver.
struct Shared<C: Codec> {
    codec: C,
    config: StreamConfig,
    inbound: InboundQueue,
    subscribers: SubscriberRegistry<C::Message>,
    outbound: Mutex<OutboundQueue>,
    state: Mutex<ConnectionState>,
    /// Set once on a transport or protocol error. Never reset.
    error: AtomicBool,
    /// Wakes the driver after publish or close.
    wake: Notify,
    /// Live `Stream` handles.
    handles: AtomicUsize,
}

impl<C: Codec> Shared<C> {
    fn new(codec: C, config: StreamConfig, state: ConnectionState) -> Self {
        Self {
            inbound: InboundQueue::new(config.capacity),
            subscribers: SubscriberRegistry::new(),
            outbound: Mutex::new(OutboundQueue::new(config.max_send_chunk)),
            state: Mutex::new(state),
            error: AtomicBool::new(false),
            wake: Notify::new(),
            handles: AtomicUsize::new(1),
            codec,
            config,
        }
    }

    fn outbound(&self) -> MutexGuard<'_, OutboundQueue> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move from `Connecting` to `Connected`. False if closed meanwhile.
    fn mark_connected(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ConnectionState::Connecting => {
                *state = ConnectionState::Connected;
                true
            }
            ConnectionState::Connected => true,
            ConnectionState::Closed => false,
        }
    }

    fn accepting(&self) -> bool {
        !self.error.load(Ordering::Acquire) && self.state() != ConnectionState::Closed
    }

    fn enqueue(&self, entry: Outbound) -> Result<()> {
        {
            let mut outbound = self.outbound();
            if !self.accepting() {
                return Err(LinewireError::ConnectionClosed);
            }
            outbound.push(entry);
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Close the connection. Returns false if it was already closed.
    fn shutdown(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == ConnectionState::Closed {
                return false;
            }
            *state = ConnectionState::Closed;
        }
        self.outbound().clear();
        self.inbound.close();
        self.wake.notify_one();
        true
    }

    /// Record an unrecoverable error and close.
    fn fail(&self, error: &dyn fmt::Display) {
        self.error.store(true, Ordering::Release);
        tracing::error!("Stream failed: {}", error);
        self.shutdown();
    }

    /// Resolves once the stream is closed.
    async fn closed(&self) {
        loop {
            let notified = self.wake.notified();
            if self.state() == ConnectionState::Closed {
                return;
            }
            notified.await;
        }
    }

    /// Queue a received line, then fan it out to subscribers.
    fn deliver(&self, line: Bytes) {
        tracing::trace!(len = line.len(), "Line received");
        self.inbound.push(line.clone());
        self.subscribers.dispatch(|| self.codec.decode(&line));
    }
}

/// Builder for configuring and creating a stream.
pub struct StreamBuilder<C: Codec> {
    codec: C,
    config: StreamConfig,
    span: Option<tracing::Span>,
}

impl<C: Codec> StreamBuilder<C> {
    /// Create a builder using `codec` and the default configuration.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            config: StreamConfig::default(),
            span: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many received lines are kept for `get`/`last`.
    ///
    /// Default: 100
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the line terminator.
    ///
    /// Default: `\n`
    pub fn terminator(mut self, terminator: impl Into<Bytes>) -> Self {
        self.config.terminator = terminator.into();
        self
    }

    /// Set the maximum bytes per socket send.
    ///
    /// Default: 64 KiB
    pub fn max_send_chunk(mut self, bytes: usize) -> Self {
        self.config.max_send_chunk = bytes;
        self
    }

    /// Set the socket read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.config.read_buffer_size = bytes;
        self
    }

    /// Set the maximum length of a partially received line.
    ///
    /// Default: 16 MiB
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.config.max_line_length = bytes;
        self
    }

    /// Run the driver inside `span` instead of the default `linewire` span.
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Connect to `host:port` over TCP.
    ///
    /// Returns immediately in the `Connecting` state; the connection is
    /// established by the driver. Messages published meanwhile are sent
    /// once connected.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn connect(
        self,
        host: impl Into<String>,
        port: u16,
    ) -> Result<(Stream<C>, Driver<C, TcpStream>)> {
        let host = host.into();
        let peer = format!("{host}:{port}");
        let span = tracing::info_span!("linewire", peer = %peer);
        let connect: BoxFuture<'static, io::Result<TcpStream>> = Box::pin(connect_tcp(host, port));
        self.build(Pending::Connecting(connect), ConnectionState::Connecting, span)
    }

    /// Connect to `localhost:1234`.
    pub fn connect_default(self) -> Result<(Stream<C>, Driver<C, TcpStream>)> {
        self.connect(DEFAULT_HOST, DEFAULT_PORT)
    }

    /// Wrap an already connected socket.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configuration is invalid.
    pub fn attach<S: Socket>(self, socket: S) -> Result<(Stream<C>, Driver<C, S>)> {
        let span = tracing::info_span!("linewire");
        self.build(Pending::Connected(socket), ConnectionState::Connected, span)
    }

    fn build<S: Socket>(
        self,
        socket: Pending<S>,
        state: ConnectionState,
        default_span: tracing::Span,
    ) -> Result<(Stream<C>, Driver<C, S>)> {
        self.config.validate()?;

        let lines = LineBuffer::with_max_line_length(
            &self.config.terminator,
            self.config.max_line_length,
        );
        let shared = Arc::new(Shared::new(self.codec, self.config, state));

        let stream = Stream {
            shared: shared.clone(),
        };
        let driver = Driver {
            closer: CloseOnDrop(shared.clone()),
            shared,
            socket,
            lines,
            span: self.span.unwrap_or(default_span),
        };
        Ok((stream, driver))
    }
}

/// Handle to a line stream.
///
/// Cheap to clone; all clones share one connection. Every method except
/// [`get`](Self::get) returns without blocking. Dropping the last handle
/// closes the stream. A handle captured by a subscriber counts as live.
pub struct Stream<C: Codec> {
    shared: Arc<Shared<C>>,
}

impl<C: Codec> Clone for Stream<C> {
    fn clone(&self) -> Self {
        self.shared.handles.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Codec> Drop for Stream<C> {
    fn drop(&mut self) {
        if self.shared.handles.fetch_sub(1, Ordering::AcqRel) == 1 && self.shared.shutdown() {
            tracing::debug!("Last stream handle dropped");
        }
    }
}

impl<C: Codec> Stream<C> {
    /// Create a stream builder using `codec`.
    pub fn builder(codec: C) -> StreamBuilder<C> {
        StreamBuilder::new(codec)
    }

    /// Register a subscriber for every message received from now on.
    ///
    /// Subscribers run on the driver task, in registration order.
    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
    where
        S: Subscriber<C::Message>,
    {
        self.shared.subscribers.subscribe(subscriber)
    }

    /// Remove a subscriber.
    ///
    /// # Errors
    ///
    /// Returns `SubscriberNotFound` if `id` is not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.shared.subscribers.unsubscribe(id)
    }

    /// Encode `message` and queue it for sending.
    ///
    /// # Errors
    ///
    /// Returns an encode error, `Protocol` if the encoded payload contains
    /// the terminator, or `ConnectionClosed` once the stream is closed.
    pub fn publish(&self, message: &C::Message) -> Result<()> {
        let payload = self.shared.codec.encode(message)?;
        let frame = frame_line(&payload, &self.shared.config.terminator)?;
        self.shared.enqueue(Outbound::Data(frame))
    }

    /// Wait for the next message and return it decoded.
    ///
    /// Only messages arriving after the call starts are considered; if
    /// several arrive before this thread wakes, the most recent one is
    /// returned. `None` waits indefinitely. Blocks the calling thread: call
    /// it from `spawn_blocking` inside async code.
    ///
    /// Returns `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns a decode error for a malformed message, or
    /// `ConnectionClosed` if the stream is or becomes closed.
    pub fn get(&self, timeout: Option<Duration>) -> Result<Option<C::Message>> {
        match self.shared.inbound.wait_newer(timeout) {
            Wait::Message(line) => self.shared.codec.decode(&line).map(Some),
            Wait::TimedOut => {
                tracing::debug!("get: timed out");
                Ok(None)
            }
            Wait::Closed => Err(LinewireError::ConnectionClosed),
        }
    }

    /// The most recently received message, decoded, if any.
    ///
    /// # Errors
    ///
    /// Returns a decode error for a malformed message.
    pub fn last(&self) -> Result<Option<C::Message>> {
        match self.shared.inbound.latest() {
            Some(line) => self.shared.codec.decode(&line).map(Some),
            None => {
                tracing::debug!("last: no message in queue");
                Ok(None)
            }
        }
    }

    /// Whether the stream is connecting or connected.
    pub fn is_up(&self) -> bool {
        self.shared.state() != ConnectionState::Closed
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the stream was closed by a transport or protocol error.
    pub fn has_error(&self) -> bool {
        self.shared.error.load(Ordering::Acquire)
    }

    /// Close now, dropping unsent output.
    ///
    /// Wakes every thread blocked in [`get`](Self::get) and stops the driver,
    /// which drops the socket.
    pub fn close(&self) {
        if self.shared.shutdown() {
            tracing::debug!("Stream closed locally");
        }
    }

    /// Close after everything already published has been sent.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the stream is already closed.
    pub fn close_when_done(&self) -> Result<()> {
        self.shared.enqueue(Outbound::Close)
    }

    /// Number of outbound entries not yet fully sent.
    pub fn pending_outbound(&self) -> usize {
        self.shared.outbound().pending_len()
    }

    /// Total lines received, including those evicted from the history.
    pub fn received(&self) -> u64 {
        self.shared.inbound.received()
    }

    /// The configuration this stream was built with.
    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }
}

impl<C: Codec> fmt::Debug for Stream<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state())
            .field("error", &self.has_error())
            .field("received", &self.received())
            .finish()
    }
}

/// Socket owned by the driver, possibly still connecting.
enum Pending<S> {
    Connecting(BoxFuture<'static, io::Result<S>>),
    Connected(S),
}

/// Closes the stream when dropped.
struct CloseOnDrop<C: Codec>(Arc<Shared<C>>);

impl<C: Codec> Drop for CloseOnDrop<C> {
    fn drop(&mut self) {
        if self.0.shutdown() {
            tracing::debug!("Driver dropped before the stream closed");
        }
    }
}

/// Future performing all socket I/O for one stream.
///
/// Spawn [`run`](Self::run) on a tokio runtime. It resolves when the stream
/// closes: `Ok(())` on local close, peer disconnect or once every [`Stream`]
/// handle is dropped, `Err` on a transport or protocol error.
///
/// Dropping the driver, or aborting the task running it, closes the stream.
#[must_use = "the driver does nothing unless `run` is awaited or spawned"]
pub struct Driver<C: Codec, S: Socket> {
    shared: Arc<Shared<C>>,
    socket: Pending<S>,
    lines: LineBuffer,
    span: tracing::Span,
    closer: CloseOnDrop<C>,
}

impl<C: Codec, S: Socket> fmt::Debug for Driver<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver").finish_non_exhaustive()
    }
}

impl<C: Codec, S: Socket> Driver<C, S> {
    /// Drive the connection until it closes.
    pub async fn run(self) -> Result<()> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<()> {
        let Driver {
            shared,
            socket,
            mut lines,
            span: _,
            closer: _closer,
        } = self;

        let socket = match socket {
            Pending::Connected(socket) => socket,
            Pending::Connecting(connect) => {
                let connected = tokio::select! {
                    connected = connect => connected,
                    _ = shared.closed() => {
                        tracing::debug!("Closed before the connection was established");
                        return Ok(());
                    }
                };
                match connected {
                    Ok(socket) if shared.mark_connected() => socket,
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        shared.fail(&e);
                        return Err(e.into());
                    }
                }
            }
        };
        tracing::debug!("Connected");

        let mut buf = vec![0u8; shared.config.read_buffer_size];

        loop {
            if shared.state() == ConnectionState::Closed {
                break;
            }

            let interest = if shared.outbound().has_pending() {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };

            let ready = tokio::select! {
                ready = socket.ready(interest) => ready,
                _ = shared.wake.notified() => continue,
            };
            let ready = match ready {
                Ok(ready) => ready,
                Err(e) => {
                    shared.fail(&e);
                    return Err(e.into());
                }
            };

            if ready.is_readable() || ready.is_read_closed() {
                match socket.try_recv(&mut buf) {
                    Ok(0) => {
                        tracing::debug!("Peer closed the connection");
                        shared.shutdown();
                        break;
                    }
                    Ok(n) => {
                        let received = match lines.push(&buf[..n]) {
                            Ok(received) => received,
                            Err(e) => {
                                shared.fail(&e);
                                return Err(e);
                            }
                        };
                        for line in received {
                            // A subscriber may have closed the stream.
                            if shared.state() == ConnectionState::Closed {
                                break;
                            }
                            shared.deliver(line);
                        }
                    }
                    Err(e) if is_transient(&e) => {}
                    Err(e) => {
                        shared.fail(&e);
                        return Err(e.into());
                    }
                }
            }

            if ready.is_writable() && shared.state() != ConnectionState::Closed {
                let outcome = shared.outbound().drain_once(&socket);
                match outcome {
                    DrainOutcome::Close => {
                        tracing::debug!("Close requested after pending output");
                        shared.shutdown();
                        break;
                    }
                    DrainOutcome::Failed(e) => {
                        shared.fail(&e);
                        return Err(e.into());
                    }
                    DrainOutcome::Partial(sent) => {
                        tracing::trace!(sent, "Partial send");
                    }
                    DrainOutcome::Sent(_) | DrainOutcome::WouldBlock | DrainOutcome::Idle => {}
                }
            }
        }

        Ok(())
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
