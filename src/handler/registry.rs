//! Subscriber registry for fanning out decoded messages.
//!
//! Subscribers run synchronously on the driver task, in registration
//! order. A slow subscriber delays all I/O on its stream, so subscribers
//! should hand heavy work off to another task or thread.
//!
//! The registry is shared between the driver and consumer handles, so the
//! list sits behind a mutex. Dispatch works on a snapshot taken under the
//! lock, which lets a subscriber subscribe or unsubscribe from inside its
//! own callback.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{LinewireError, Result};

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Build an id from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receiver of decoded messages.
///
/// Any `Fn(&M) + Send + Sync + 'static` closure is a subscriber that
/// ignores decode errors beyond the default warning.
pub trait Subscriber<M>: Send + Sync + 'static {
    /// Called once per received message.
    fn on_message(&self, message: &M);

    /// Called instead of `on_message` when the received line fails to decode.
    fn on_decode_error(&self, error: &LinewireError) {
        tracing::warn!("Dropping undecodable message: {}", error);
    }
}

impl<M, F> Subscriber<M> for F
where
    F: Fn(&M) + Send + Sync + 'static,
{
    fn on_message(&self, message: &M) {
        self(message)
    }
}

/// Entry for a registered subscriber.
struct Entry<M> {
    id: SubscriptionId,
    subscriber: Arc<dyn Subscriber<M>>,
}

impl<M> Clone for Entry<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            subscriber: self.subscriber.clone(),
        }
    }
}

/// Ordered list of subscribers.
pub struct SubscriberRegistry<M> {
    entries: Mutex<Vec<Entry<M>>>,
    /// Next id to assign. Ids are never reused.
    next_id: AtomicU64,
}

impl<M: 'static> SubscriberRegistry<M> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry<M>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a subscriber. The same subscriber may be registered twice.
    pub fn subscribe<S>(&self, subscriber: S) -> SubscriptionId
    where
        S: Subscriber<M>,
    {
        self.subscribe_arc(Arc::new(subscriber))
    }

    /// Append a shared subscriber.
    pub fn subscribe_arc(&self, subscriber: Arc<dyn Subscriber<M>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Entry { id, subscriber });
        tracing::debug!(subscription = %id, "Subscriber added");
        id
    }

    /// Remove the registration with the given id.
    ///
    /// # Errors
    ///
    /// Returns `SubscriberNotFound` if the id is not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut entries = self.lock();
        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(LinewireError::SubscriberNotFound(id))?;
        entries.remove(index);
        tracing::debug!(subscription = %id, "Subscriber removed");
        Ok(())
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Decode once and hand the result to every subscriber.
    ///
    /// `decode` is not called when there are no subscribers. A panicking
    /// subscriber is logged and skipped. Returns the number of subscribers
    /// invoked.
    pub fn dispatch<F>(&self, decode: F) -> usize
    where
        F: FnOnce() -> Result<M>,
    {
        let snapshot: Vec<Entry<M>> = self.lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let decoded = decode();
        for entry in &snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| match &decoded {
                Ok(message) => entry.subscriber.on_message(message),
                Err(e) => entry.subscriber.on_decode_error(e),
            }));
            if outcome.is_err() {
                tracing::error!(subscription = %entry.id, "Subscriber panicked");
            }
        }

        snapshot.len()
    }
}

impl<M: 'static> Default for SubscriberRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for SubscriberRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<SubscriptionId> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.id)
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("subscriptions", &ids)
            .finish()
    }
}
