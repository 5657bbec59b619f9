//! Cranewatch snapshot fan-out.
//!
//! - [`SubscriberNotifier`]: registry of live consumers that receive every
//!   committed [`Snapshot`](cranewatch_core::snapshot::Snapshot). Delivery
//!   is best-effort: a subscriber that is gone or cannot keep up is dropped
//!   instead of slowing down the publisher.
//! - [`SnapshotUpdate`]: the message envelope pushed to stream clients.

pub mod message;
pub mod notifier;

pub use message::SnapshotUpdate;
pub use notifier::{PublishReport, SubscriberId, SubscriberNotifier, Subscription};
