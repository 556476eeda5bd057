//! Outbound queue with partial-write bookkeeping.
//!
//! Published frames are queued in order and drained by the driver, one
//! send per writability notification:
//!
//! ```text
//! publish ─► pending: [frame, frame, Close, ...] ─► in-flight slot ─► try_send
//!                                                        ▲               │
//!                                                        └── remainder ──┘
//! ```
//!
//! A partially sent frame stays in the in-flight slot, so it always goes
//! out before any frame queued after it. Sends are capped at
//! `max_send_chunk` bytes.

use std::collections::VecDeque;
use std::io;

use bytes::Bytes;

use crate::transport::Transmit;

/// Default maximum bytes handed to the socket in one send.
pub const DEFAULT_MAX_SEND_CHUNK: usize = 64 * 1024;

/// An entry in the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A framed message (payload + terminator).
    Data(Bytes),
    /// Close the connection once everything before this entry is sent.
    Close,
}

/// Result of one [`OutboundQueue::drain_once`] call.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Nothing to send.
    Idle,
    /// A whole frame (or its last remainder) was sent.
    Sent(usize),
    /// Part of a frame was sent; the rest is in flight.
    Partial(usize),
    /// The socket accepted nothing; the frame is still in flight.
    WouldBlock,
    /// The close sentinel was reached.
    Close,
    /// The send failed. The frame is dropped.
    Failed(io::Error),
}

/// FIFO of pending frames plus the frame currently being sent.
#[derive(Debug)]
pub struct OutboundQueue {
    pending: VecDeque<Outbound>,
    /// Unsent tail of the frame at the head of the stream.
    in_flight: Option<Bytes>,
    max_chunk: usize,
}

impl OutboundQueue {
    /// Create an empty queue sending at most `max_chunk` bytes per call.
    pub fn new(max_chunk: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            max_chunk: max_chunk.max(1),
        }
    }

    /// Queue an entry behind everything already pending.
    pub fn push(&mut self, entry: Outbound) {
        self.pending.push_back(entry);
    }

    /// Whether anything (data or close) is waiting to be sent.
    pub fn has_pending(&self) -> bool {
        self.in_flight.is_some() || !self.pending.is_empty()
    }

    /// Number of queued entries, counting the in-flight frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    /// Unsent bytes across all queued frames.
    pub fn pending_bytes(&self) -> usize {
        let queued: usize = self
            .pending
            .iter()
            .map(|entry| match entry {
                Outbound::Data(bytes) => bytes.len(),
                Outbound::Close => 0,
            })
            .sum();
        queued + self.in_flight.as_ref().map_or(0, Bytes::len)
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }

    /// Perform at most one send.
    pub fn drain_once<T>(&mut self, transport: &T) -> DrainOutcome
    where
        T: Transmit + ?Sized,
    {
        let frame = loop {
            if let Some(frame) = self.in_flight.take() {
                break frame;
            }
            match self.pending.pop_front() {
                None => return DrainOutcome::Idle,
                Some(Outbound::Close) => return DrainOutcome::Close,
                Some(Outbound::Data(frame)) if frame.is_empty() => continue,
                Some(Outbound::Data(frame)) => break frame,
            }
        };

        let chunk_len = frame.len().min(self.max_chunk);
        match transport.try_send(&frame[..chunk_len]) {
            Ok(0) => {
                self.in_flight = Some(frame);
                DrainOutcome::WouldBlock
            }
            Ok(sent) if sent < frame.len() => {
                self.in_flight = Some(frame.slice(sent..));
                DrainOutcome::Partial(sent)
            }
            Ok(sent) => DrainOutcome::Sent(sent),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.in_flight = Some(frame);
                DrainOutcome::WouldBlock
            }
            Err(e) => DrainOutcome::Failed(e),
        }
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEND_CHUNK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport accepting at most `limit` bytes per send.
    struct Throttled {
        limit: usize,
        wire: Mutex<Vec<u8>>,
        sends: Mutex<usize>,
    }

    impl Throttled {
        fn new(limit: usize) -> Self {
            Self {
                limit,
                wire: Mutex::new(Vec::new()),
                sends: Mutex::new(0),
            }
        }
    }

    impl Transmit for Throttled {
        fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
            *self.sends.lock().unwrap() += 1;
            let n = buf.len().min(self.limit);
            self.wire.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    struct Failing;

    impl Transmit for Failing {
        fn try_send(&self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }
    }

    struct Blocked;

    impl Transmit for Blocked {
        fn try_send(&self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    fn data(bytes: &'static [u8]) -> Outbound {
        Outbound::Data(Bytes::from_static(bytes))
    }

    #[test]
    fn test_idle_when_empty() {
        let mut queue = OutboundQueue::new(16);
        assert!(matches!(queue.drain_once(&Throttled::new(16)), DrainOutcome::Idle));
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_one_send_per_call() {
        let mut queue = OutboundQueue::new(64);
        let transport = Throttled::new(64);
        queue.push(data(b"a\n"));
        queue.push(data(b"b\n"));

        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Sent(2)));
        assert_eq!(*transport.wire.lock().unwrap(), b"a\n");
        assert_eq!(queue.pending_len(), 1);

        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Sent(2)));
        assert_eq!(*transport.wire.lock().unwrap(), b"a\nb\n");
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_chunked_frame_drains_in_order() {
        let mut queue = OutboundQueue::new(4);
        let transport = Throttled::new(usize::MAX);
        let big: Vec<u8> = (0..30u8).map(|i| b'a' + (i % 26)).collect();
        queue.push(Outbound::Data(Bytes::from(big.clone())));
        queue.push(data(b"second\n"));

        let mut calls = 0;
        while queue.has_pending() {
            match queue.drain_once(&transport) {
                DrainOutcome::Sent(_) | DrainOutcome::Partial(_) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
            calls += 1;
        }

        let mut expected = big;
        expected.extend_from_slice(b"second\n");
        assert_eq!(*transport.wire.lock().unwrap(), expected);
        // 30 bytes in chunks of 4, then "second\n" in two chunks.
        assert_eq!(calls, 8 + 2);
    }

    #[test]
    fn test_partial_send_keeps_remainder_ahead() {
        let mut queue = OutboundQueue::new(1024);
        let transport = Throttled::new(3);
        queue.push(data(b"hello\n"));
        queue.push(data(b"world\n"));

        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Partial(3)));
        assert_eq!(queue.pending_bytes(), 3 + 6);

        // Later publish must not overtake the remainder.
        queue.push(data(b"!\n"));
        while queue.has_pending() {
            queue.drain_once(&transport);
        }

        assert_eq!(*transport.wire.lock().unwrap(), b"hello\nworld\n!\n");
    }

    #[test]
    fn test_would_block_keeps_frame() {
        let mut queue = OutboundQueue::new(16);
        queue.push(data(b"retry\n"));

        assert!(matches!(queue.drain_once(&Blocked), DrainOutcome::WouldBlock));
        assert_eq!(queue.pending_bytes(), 6);

        let transport = Throttled::new(16);
        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Sent(6)));
        assert_eq!(*transport.wire.lock().unwrap(), b"retry\n");
    }

    #[test]
    fn test_failure_drops_frame() {
        let mut queue = OutboundQueue::new(16);
        queue.push(data(b"lost\n"));
        queue.push(data(b"next\n"));

        match queue.drain_once(&Failing) {
            DrainOutcome::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_close_sentinel_after_data() {
        let mut queue = OutboundQueue::new(16);
        let transport = Throttled::new(16);
        queue.push(data(b"bye\n"));
        queue.push(Outbound::Close);
        queue.push(data(b"never\n"));

        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Sent(4)));
        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Close));
        assert_eq!(*transport.wire.lock().unwrap(), b"bye\n");
        assert_eq!(*transport.sends.lock().unwrap(), 1);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut queue = OutboundQueue::new(16);
        let transport = Throttled::new(16);
        queue.push(Outbound::Data(Bytes::new()));
        queue.push(data(b"x\n"));

        assert!(matches!(queue.drain_once(&transport), DrainOutcome::Sent(2)));
        assert_eq!(*transport.sends.lock().unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = OutboundQueue::new(2);
        queue.push(data(b"abcdef"));
        queue.drain_once(&Throttled::new(16));
        assert!(queue.has_pending());

        queue.clear();
        assert!(!queue.has_pending());
        assert_eq!(queue.pending_bytes(), 0);
    }
}
