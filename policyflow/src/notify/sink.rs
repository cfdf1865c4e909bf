//! Notification sink trait and implementations.

use super::{Notification, Severity};
use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn, Level};

/// Receiver of policy notifications.
///
/// Sinks are called synchronously at the transition point and must not block.
/// They have no influence on control flow.
pub trait NotificationSink: Send + Sync {
    /// Receives a notification.
    fn notify(&self, notification: &Notification);
}

impl<F> NotificationSink for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn notify(&self, notification: &Notification) {
        self(notification);
    }
}

/// A sink that discards all notifications.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl NotificationSink for NoOpSink {
    fn notify(&self, _notification: &Notification) {}
}

/// A sink that logs notifications using the tracing framework.
///
/// The level follows the notification severity unless a fixed level is set.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink {
    level: Option<Level>,
}

impl LoggingSink {
    /// Creates a sink that logs every notification at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level: Some(level) }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn level_for(&self, severity: Severity) -> Level {
        self.level.unwrap_or(match severity {
            Severity::Info | Severity::Success => Level::INFO,
            Severity::Warning => Level::WARN,
            Severity::Error => Level::ERROR,
        })
    }
}

impl NotificationSink for LoggingSink {
    fn notify(&self, n: &Notification) {
        let kind = n.kind.to_string();
        let failure = n.failure_message.as_deref().unwrap_or("");
        match self.level_for(n.severity) {
            Level::ERROR => error!(event = %kind, policy = %n.policy, attempt = ?n.attempt, failure, "{}", n.message),
            Level::WARN => warn!(event = %kind, policy = %n.policy, attempt = ?n.attempt, failure, "{}", n.message),
            Level::INFO => info!(event = %kind, policy = %n.policy, attempt = ?n.attempt, failure, "{}", n.message),
            _ => debug!(event = %kind, policy = %n.policy, attempt = ?n.attempt, failure, "{}", n.message),
        }
    }
}

/// A sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    notifications: RwLock<Vec<Notification>>,
}

impl CollectingSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    /// Returns the number of collected notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifications.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifications.read().is_empty()
    }

    /// Returns how many notifications of `kind` were collected.
    #[must_use]
    pub fn count_of(&self, kind: super::NotificationKind) -> usize {
        self.notifications
            .read()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Returns the collected kinds in emission order.
    #[must_use]
    pub fn kinds(&self) -> Vec<super::NotificationKind> {
        self.notifications.read().iter().map(|n| n.kind).collect()
    }

    /// Clears all collected notifications.
    pub fn clear(&self) {
        self.notifications.write().clear();
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, notification: &Notification) {
        self.notifications.write().push(notification.clone());
    }
}

/// A sink that forwards notifications to an async consumer.
///
/// Sends never block; notifications emitted after the receiver is dropped
/// are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Creates a sink feeding `sender`.
    #[must_use]
    pub fn new(sender: UnboundedSender<Notification>) -> Self {
        Self { sender }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        if self.sender.send(notification.clone()).is_err() {
            debug!(event = %notification.kind, "notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample(kind: NotificationKind) -> Notification {
        Notification::new(kind, "test", "message")
    }

    #[test]
    fn test_noop_sink() {
        NoOpSink.notify(&sample(NotificationKind::BreakerOpened));
    }

    #[test]
    fn test_logging_sink() {
        let sink = LoggingSink::default();
        sink.notify(&sample(NotificationKind::RetryScheduled));
        LoggingSink::debug().notify(&sample(NotificationKind::BreakerReset));
    }

    #[test]
    fn test_logging_sink_level_follows_severity() {
        let sink = LoggingSink::default();
        assert_eq!(sink.level_for(Severity::Error), Level::ERROR);
        assert_eq!(sink.level_for(Severity::Success), Level::INFO);
        assert_eq!(LoggingSink::debug().level_for(Severity::Error), Level::DEBUG);
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.notify(&sample(NotificationKind::RetryScheduled));
        sink.notify(&sample(NotificationKind::RetryScheduled));
        sink.notify(&sample(NotificationKind::FallbackTriggered));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count_of(NotificationKind::RetryScheduled), 2);
        assert_eq!(
            sink.kinds(),
            vec![
                NotificationKind::RetryScheduled,
                NotificationKind::RetryScheduled,
                NotificationKind::FallbackTriggered,
            ]
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let sink = move |_n: &Notification| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        };

        sink.notify(&sample(NotificationKind::BreakerHalfOpen));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.notify(&sample(NotificationKind::BreakerOpened));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::BreakerOpened);

        drop(rx);
        sink.notify(&sample(NotificationKind::BreakerReset));
    }
}
