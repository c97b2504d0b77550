//! chatwire_hub
//!
//! In-process event fan-out keyed by topic. Producers call
//! `NotificationHub::publish`; every subscriber registered on that topic at
//! that moment gets its own copy in a bounded per-subscriber queue, read
//! through a `SubscriptionHandle`.
//!
//! Delivery is best-effort and at-most-once: a full queue drops the event for
//! that subscriber only, and nothing is replayed to late subscribers.

pub mod handle;
pub mod hub;
pub mod topic;

pub use handle::SubscriptionHandle;
pub use hub::NotificationHub;
pub use topic::SubscriberId;
