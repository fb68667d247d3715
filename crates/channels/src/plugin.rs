use async_trait::async_trait;

use crate::Result;

/// One inbound chat message, as delivered by a chat adapter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatEvent {
    /// Sender's display name (the platform username).
    pub sender_display_name: String,
    /// Sender's platform user ID; direct replies are addressed to it.
    pub sender_id: String,
    /// Room the message arrived in. Adapters report a direct message with
    /// the sender's display name as the room.
    pub room: String,
    /// Message text exactly as the platform delivered it.
    pub text: String,
}

impl ChatEvent {
    /// A direct message is one whose room carries the sender's own name.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.sender_display_name == self.room
    }
}

/// Receives inbound chat events from an adapter.
#[async_trait]
pub trait ChatEventSink: Send + Sync {
    /// Handle one message. Implementations must not fail the adapter: any
    /// per-message error is handled (and logged) inside.
    async fn on_message(&self, event: ChatEvent);
}

/// Send messages to the chat platform.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Post `text` to `to`, which is either a room or a user ID.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;
}
