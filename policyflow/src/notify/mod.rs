//! Observational notifications.
//!
//! Policies report retries, breaker transitions and fallbacks to a
//! [`NotificationSink`]. The core never reads from a sink; rendering,
//! aggregation and statistics belong to the caller.

mod notification;
mod sink;

pub use notification::{Notification, NotificationKind, Severity};
pub use sink::{ChannelSink, CollectingSink, LoggingSink, NoOpSink, NotificationSink};
