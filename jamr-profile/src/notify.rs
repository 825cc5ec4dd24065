//! Outbound profile notifications
//!
//! Publication is fire-and-forget: the orchestrator calls the sink after the
//! update transaction has committed and only logs failures.

use jamr_common::events::{EventBus, ProfileEvent};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No subscribers for {0}")]
    NoSubscribers(String),

    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiver of profile change notifications
pub trait NotificationSink: Send + Sync {
    fn nickname_changed(
        &self,
        profile_id: &str,
        old_nickname: &str,
        new_nickname: &str,
    ) -> Result<(), NotifyError>;

    /// Any committed update; best effort, no error reporting
    fn profile_updated(&self, _profile_id: &str, _version: i64) {}
}

/// Publishes notifications on the shared [`EventBus`]
pub struct EventBusNotifier {
    bus: Arc<EventBus>,
}

impl EventBusNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl NotificationSink for EventBusNotifier {
    fn nickname_changed(
        &self,
        profile_id: &str,
        old_nickname: &str,
        new_nickname: &str,
    ) -> Result<(), NotifyError> {
        let event = ProfileEvent::NicknameChanged {
            profile_id: profile_id.to_string(),
            old_nickname: old_nickname.to_string(),
            new_nickname: new_nickname.to_string(),
            timestamp: chrono::Utc::now(),
        };
        self.bus
            .emit(event)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers(format!("nickname change of {}", profile_id)))
    }

    fn profile_updated(&self, profile_id: &str, version: i64) {
        self.bus.emit_lossy(ProfileEvent::ProfileUpdated {
            profile_id: profile_id.to_string(),
            version,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_change_published() {
        let bus = Arc::new(EventBus::new(10));
        let mut rx = bus.subscribe();
        let notifier = EventBusNotifier::new(Arc::clone(&bus));

        notifier.nickname_changed("p1", "old", "new").unwrap();

        match rx.try_recv().unwrap() {
            ProfileEvent::NicknameChanged {
                profile_id,
                old_nickname,
                new_nickname,
                ..
            } => {
                assert_eq!(profile_id, "p1");
                assert_eq!(old_nickname, "old");
                assert_eq!(new_nickname, "new");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_no_subscribers_is_error() {
        let notifier = EventBusNotifier::new(Arc::new(EventBus::new(10)));
        let err = notifier.nickname_changed("p1", "a", "b").unwrap_err();
        assert!(matches!(err, NotifyError::NoSubscribers(_)));

        // Never fails
        notifier.profile_updated("p1", 2);
    }
}
