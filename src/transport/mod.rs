//! Transport abstraction for chat-session I/O.
//!
//! The core never touches transport internals beyond this surface: an
//! event stream of lifecycle + message events, plus reply/download/send
//! operations. Concrete transports live in submodules.

pub mod event;
pub mod telegram;

pub use event::{AttachmentPayload, InboundMessage, TransportEvent};
pub use telegram::TelegramTransport;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Boxed stream of transport events.
pub type EventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// A chat-session transport.
///
/// `initialize` is called once per session; after a disconnect the
/// supervisor tears the transport down and calls it again.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Connect and return the event stream for this session.
    async fn initialize(&self) -> Result<EventStream, ChannelError>;

    /// Reply to the sender of an inbound message.
    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError>;

    /// Download the attachment carried by an inbound message.
    async fn download_attachment(
        &self,
        msg: &InboundMessage,
    ) -> Result<AttachmentPayload, ChannelError>;

    /// Send a text to an arbitrary recipient (operator relays).
    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;

    /// Tear down the current session. Best-effort; failures are tolerated.
    async fn teardown(&self) -> Result<(), ChannelError>;
}
