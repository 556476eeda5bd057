//! Bounded inbound message history with blocking retrieval.
//!
//! The queue holds raw (undecoded) lines in arrival order. When full, the
//! oldest line is evicted on insert. All access goes through one mutex; a
//! condition variable signals arrivals and closure.
//!
//! Waiters never see a line that was already queued when they started
//! waiting: each push bumps an arrival generation and
//! [`InboundQueue::wait_newer`] blocks until the generation moves past the
//! value observed on entry. Spurious wake-ups are absorbed by the loop.
//!
//! # Example
//!
//! ```
//! use linewire::inbound::{InboundQueue, Wait};
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let queue = InboundQueue::new(2);
//! queue.push(Bytes::from_static(b"1"));
//! queue.push(Bytes::from_static(b"2"));
//! queue.push(Bytes::from_static(b"3"));
//!
//! assert_eq!(queue.snapshot(), vec![&b"2"[..], &b"3"[..]]);
//! assert_eq!(queue.latest().unwrap(), &b"3"[..]);
//! assert!(matches!(
//!     queue.wait_newer(Some(Duration::from_millis(10))),
//!     Wait::TimedOut
//! ));
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;

/// Outcome of [`InboundQueue::wait_newer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    /// The most recent line once a new one arrived.
    Message(Bytes),
    /// No line arrived before the timeout.
    TimedOut,
    /// The queue was closed before a new line arrived.
    Closed,
}

#[derive(Debug)]
struct State {
    entries: VecDeque<Bytes>,
    /// Total lines ever pushed.
    received: u64,
    closed: bool,
}

/// Bounded, oldest-evicting FIFO of raw lines guarded by a monitor.
#[derive(Debug)]
pub struct InboundQueue {
    state: Mutex<State>,
    arrived: Condvar,
    capacity: usize,
}

impl InboundQueue {
    /// Create a queue holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                entries: VecDeque::with_capacity(capacity),
                received: 0,
                closed: false,
            }),
            arrived: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line, evicting the oldest one if the queue is full, and
    /// wake every waiter.
    pub fn push(&self, line: Bytes) {
        let mut state = self.lock();
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(line);
        state.received += 1;
        drop(state);

        self.arrived.notify_all();
    }

    /// The most recent line, if any. Never blocks on arrivals.
    pub fn latest(&self) -> Option<Bytes> {
        self.lock().entries.back().cloned()
    }

    /// Block until a line newer than any queued at call time arrives.
    ///
    /// `None` waits indefinitely. Returns [`Wait::Closed`] as soon as the
    /// queue is closed, including when it was already closed on entry.
    pub fn wait_newer(&self, timeout: Option<Duration>) -> Wait {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        let seen = state.received;

        loop {
            if state.received != seen {
                // Capacity is at least 1, so a push always leaves an entry behind.
                return match state.entries.back() {
                    Some(line) => Wait::Message(line.clone()),
                    None => Wait::TimedOut,
                };
            }
            if state.closed {
                return Wait::Closed;
            }

            state = match deadline {
                None => self
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Wait::TimedOut;
                    }
                    self.arrived
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Mark the queue closed and wake every waiter.
    ///
    /// Queued lines stay readable through [`latest`](Self::latest).
    pub fn close(&self) {
        self.lock().closed = true;
        self.arrived.notify_all();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy of the queued lines, oldest first.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no line has been queued yet.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Total number of lines pushed, including evicted ones.
    pub fn received(&self) -> u64 {
        self.lock().received
    }

    /// Maximum number of queued lines.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn line(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    #[test]
    fn test_eviction_oldest_first() {
        let queue = InboundQueue::new(2);
        queue.push(line("1"));
        queue.push(line("2"));
        queue.push(line("3"));

        assert_eq!(queue.snapshot(), vec![line("2"), line("3")]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.received(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = InboundQueue::new(0);
        assert_eq!(queue.capacity(), 1);

        queue.push(line("a"));
        queue.push(line("b"));
        assert_eq!(queue.snapshot(), vec![line("b")]);
    }

    #[test]
    fn test_latest() {
        let queue = InboundQueue::new(4);
        assert!(queue.latest().is_none());
        assert!(queue.is_empty());

        queue.push(line("a"));
        queue.push(line("b"));
        assert_eq!(queue.latest(), Some(line("b")));
    }

    #[test]
    fn test_wait_times_out() {
        let queue = InboundQueue::new(4);
        let start = Instant::now();

        let result = queue.wait_newer(Some(Duration::from_millis(50)));

        assert_eq!(result, Wait::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_ignores_already_queued() {
        let queue = InboundQueue::new(4);
        queue.push(line("old"));

        let result = queue.wait_newer(Some(Duration::from_millis(20)));
        assert_eq!(result, Wait::TimedOut);
    }

    #[test]
    fn test_wait_returns_new_message() {
        let queue = Arc::new(InboundQueue::new(4));
        queue.push(line("old"));

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_newer(Some(Duration::from_secs(5))))
        };

        // Give the waiter time to block first.
        thread::sleep(Duration::from_millis(50));
        queue.push(line("new"));

        assert_eq!(waiter.join().unwrap(), Wait::Message(line("new")));
    }

    #[test]
    fn test_sequential_waits_never_repeat() {
        let queue = Arc::new(InboundQueue::new(4));

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let first = queue.wait_newer(Some(Duration::from_secs(5)));
                let second = queue.wait_newer(Some(Duration::from_millis(100)));
                (first, second)
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.push(line("only"));

        let (first, second) = waiter.join().unwrap();
        assert_eq!(first, Wait::Message(line("only")));
        assert_eq!(second, Wait::TimedOut);
    }

    #[test]
    fn test_close_wakes_all_waiters() {
        let queue = Arc::new(InboundQueue::new(4));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait_newer(None))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Wait::Closed);
        }
        assert!(queue.is_closed());
    }

    #[test]
    fn test_wait_on_closed_queue_returns_immediately() {
        let queue = InboundQueue::new(4);
        queue.push(line("kept"));
        queue.close();

        assert_eq!(queue.wait_newer(None), Wait::Closed);
        assert_eq!(queue.latest(), Some(line("kept")));
    }
}
