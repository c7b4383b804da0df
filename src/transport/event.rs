//! Transport event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound chat message, as delivered by the transport event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Transport-assigned message identifier.
    pub id: String,
    /// Text body ("" when the message carries no text).
    pub body: String,
    /// Whether the message carries a downloadable attachment.
    pub has_attachment: bool,
    /// Arrival timestamp.
    pub received_at: DateTime<Utc>,
    /// Opaque transport metadata (chat id, file id, ...), consumed only by
    /// the transport that produced it.
    pub metadata: serde_json::Value,
}

impl InboundMessage {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            has_attachment: false,
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_attachment(mut self, has_attachment: bool) -> Self {
        self.has_attachment = has_attachment;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }
}

/// Attachment bytes plus the MIME type the transport declared for them.
#[derive(Debug, Clone)]
pub struct AttachmentPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Lifecycle and message events emitted by a transport session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One-time pairing credential that must reach the operator.
    PairingChallenge(String),
    /// The session authenticated successfully.
    Authenticated,
    /// The session is ready to exchange messages.
    Ready,
    /// The session lost connectivity.
    Disconnected { reason: String },
    /// An inbound message arrived.
    Message(InboundMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let msg = InboundMessage::new("m1", "hello");
        assert_eq!(msg.id, "m1");
        assert!(!msg.has_attachment);
        assert!(msg.metadata.is_null());
    }

    #[test]
    fn builder_sets_attachment_and_metadata() {
        let msg = InboundMessage::new("m2", "scan this")
            .with_attachment(true)
            .with_metadata(serde_json::json!({"chat_id": "42"}));
        assert!(msg.has_attachment);
        assert_eq!(msg.metadata["chat_id"], "42");
    }
}
