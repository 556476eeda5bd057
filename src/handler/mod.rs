//! Handler module - subscriber registration and fan-out.
//!
//! Provides:
//! - [`Subscriber`] - receives each decoded message (closures work directly)
//! - [`SubscriberRegistry`] - ordered list of subscribers, invoked in registration order
//! - [`SubscriptionId`] - token returned by `subscribe`, used to unsubscribe
//!
//! # Example
//!
//! ```
//! use linewire::handler::SubscriberRegistry;
//!
//! let registry = SubscriberRegistry::<String>::new();
//!
//! let id = registry.subscribe(|msg: &String| println!("got {msg}"));
//! registry.dispatch(|| Ok("hello".to_string()));
//!
//! registry.unsubscribe(id).unwrap();
//! assert!(registry.unsubscribe(id).is_err());
//! ```

mod registry;

pub use registry::{Subscriber, SubscriberRegistry, SubscriptionId};
