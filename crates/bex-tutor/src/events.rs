//! Session events and broadcasting for live surfaces.
//!
//! Every change to a session (a new message, a pending toggle, a reset or a
//! completed onboarding) is published as a [`SessionEvent`]. Surfaces such as
//! the WebSocket endpoint subscribe and re-render from the events.
//!
//! # Example
//!
//! ```no_run
//! use bex_tutor::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::pending_changed(true));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::conversation::Message;
use crate::pipeline::SessionSnapshot;
use crate::profile::StudentProfile;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
///
/// Sent immediately when a WebSocket client connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current session.
    pub session: SessionSnapshot,
}

/// Payload for the `message_appended` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAppendedPayload {
    /// The message that was appended.
    pub message: Message,
    /// When it was appended.
    pub at: DateTime<Utc>,
}

/// Payload for the `pending_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChangedPayload {
    /// Whether a reply is now pending.
    pub pending: bool,
}

/// Payload for the `session_reset` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResetPayload {
    /// The session after the reset.
    pub session: SessionSnapshot,
}

/// Payload for the `onboarding_updated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingUpdatedPayload {
    /// The stored profile.
    pub profile: StudentProfile,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Session events.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent for every message appended to the transcript.
    MessageAppended(MessageAppendedPayload),
    /// Sent when the pipeline enters or leaves `pending`.
    PendingChanged(PendingChangedPayload),
    /// Sent after a confirmed reset.
    SessionReset(SessionResetPayload),
    /// Sent when onboarding stores a profile.
    OnboardingUpdated(OnboardingUpdatedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(session: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates a `MessageAppended` event stamped with the current time.
    #[must_use]
    pub fn message_appended(message: Message) -> Self {
        Self::MessageAppended(MessageAppendedPayload {
            message,
            at: Utc::now(),
        })
    }

    /// Creates a `PendingChanged` event.
    #[must_use]
    pub const fn pending_changed(pending: bool) -> Self {
        Self::PendingChanged(PendingChangedPayload { pending })
    }

    /// Creates a `SessionReset` event.
    #[must_use]
    pub const fn session_reset(session: SessionSnapshot) -> Self {
        Self::SessionReset(SessionResetPayload { session })
    }

    /// Creates an `OnboardingUpdated` event.
    #[must_use]
    pub const fn onboarding_updated(profile: StudentProfile) -> Self {
        Self::OnboardingUpdated(OnboardingUpdatedPayload { profile })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::MessageAppended(_) => "message_appended",
            Self::PendingChanged(_) => "pending_changed",
            Self::SessionReset(_) => "session_reset",
            Self::OnboardingUpdated(_) => "onboarding_updated",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: SessionEvent) -> usize {
        // Err only means there are no receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::conversation::Transcript;
    use crate::pipeline::PipelineStatus;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            status: PipelineStatus::Idle,
            onboarding_open: true,
            profile: StudentProfile::default(),
            messages: Transcript::new("Hi").messages().to_vec(),
        }
    }

    // ------------------------------------------------------------------------
    // Event Serialization Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_connected_event_serialization() {
        let json = serde_json::to_string(&SessionEvent::connected(snapshot())).unwrap();

        assert!(json.contains(r#""event":"connected""#));
        assert!(json.contains(r#""payload""#));
        assert!(json.contains(r#""status":"idle""#));
        assert!(json.contains(r#""onboardingOpen":true"#));
        assert!(json.contains(r#""text":"Hi""#));
    }

    #[test]
    fn test_message_appended_event_serialization() {
        let event = SessionEvent::message_appended(Message::user("hello"));
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains(r#""event":"message_appended""#));
        assert!(json.contains(r#""text":"hello""#));
        assert!(json.contains(r#""sender":"user""#));
        assert!(json.contains(r#""at""#));
    }

    #[test]
    fn test_pending_changed_event_serialization() {
        let json = serde_json::to_string(&SessionEvent::pending_changed(true)).unwrap();
        assert_eq!(
            json,
            r#"{"event":"pending_changed","payload":{"pending":true}}"#
        );
    }

    #[test]
    fn test_onboarding_updated_event_serialization() {
        let profile = StudentProfile {
            name: "Sam".to_string(),
            age: Some(9),
            lesson: None,
        };
        let json = serde_json::to_string(&SessionEvent::onboarding_updated(profile)).unwrap();
        assert_eq!(
            json,
            r#"{"event":"onboarding_updated","payload":{"profile":{"name":"Sam","age":9}}}"#
        );
    }

    #[test]
    fn test_pending_changed_event_deserialization() {
        let json = r#"{"event":"pending_changed","payload":{"pending":false}}"#;
        let event: SessionEvent = serde_json::from_str(json).unwrap();

        match event {
            SessionEvent::PendingChanged(payload) => assert!(!payload.pending),
            other => panic!("Expected PendingChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(SessionEvent::connected(snapshot()).event_name(), "connected");
        assert_eq!(
            SessionEvent::message_appended(Message::assistant("x")).event_name(),
            "message_appended"
        );
        assert_eq!(
            SessionEvent::pending_changed(false).event_name(),
            "pending_changed"
        );
        assert_eq!(
            SessionEvent::session_reset(snapshot()).event_name(),
            "session_reset"
        );
        assert_eq!(
            SessionEvent::onboarding_updated(StudentProfile::default()).event_name(),
            "onboarding_updated"
        );
    }

    // ------------------------------------------------------------------------
    // Broadcaster Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver = broadcaster.subscribe();

        let count = broadcaster.send(SessionEvent::pending_changed(true));
        assert_eq!(count, 1);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::PendingChanged(_)));
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new(10);
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();

        let count = broadcaster.send(SessionEvent::session_reset(snapshot()));
        assert_eq!(count, 2);

        assert!(matches!(
            receiver1.recv().await.unwrap(),
            SessionEvent::SessionReset(_)
        ));
        assert!(matches!(
            receiver2.recv().await.unwrap(),
            SessionEvent::SessionReset(_)
        ));
    }

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = EventBroadcaster::new(10);

        // Should not panic with no subscribers
        let count = broadcaster.send(SessionEvent::pending_changed(true));
        assert_eq!(count, 0);
    }

    #[test]
    fn test_broadcaster_receiver_count() {
        let broadcaster = EventBroadcaster::default();
        assert_eq!(broadcaster.receiver_count(), 0);

        let _receiver1 = broadcaster.subscribe();
        assert_eq!(broadcaster.receiver_count(), 1);

        let _receiver2 = broadcaster.subscribe();
        assert_eq!(broadcaster.receiver_count(), 2);
    }
}
