//! Event types for the JAMR event system
//!
//! Provides shared event definitions and the in-process EventBus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// JAMR event types
///
/// Events are broadcast via EventBus and serialize with a `type` tag so they
/// can be forwarded to an external queue unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProfileEvent {
    /// Nickname changed on a committed update
    ///
    /// Triggers:
    /// - Chat service: rename the member in open rooms
    /// - Search front ends: invalidate cached summaries
    NicknameChanged {
        profile_id: String,
        old_nickname: String,
        new_nickname: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Any committed profile update (scalars, tags or image)
    ProfileUpdated {
        profile_id: String,
        /// Version after the update
        version: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ProfileEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            ProfileEvent::NicknameChanged { .. } => "NicknameChanged",
            ProfileEvent::ProfileUpdated { .. } => "ProfileUpdated",
        }
    }

    pub fn profile_id(&self) -> &str {
        match self {
            ProfileEvent::NicknameChanged { profile_id, .. }
            | ProfileEvent::ProfileUpdated { profile_id, .. } => profile_id,
        }
    }
}

/// Broadcast bus shared by everything that publishes profile events
pub struct EventBus {
    tx: broadcast::Sender<ProfileEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use jamr_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ProfileEvent,
    ) -> Result<usize, broadcast::error::SendError<ProfileEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ProfileEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
