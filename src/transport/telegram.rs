//! Telegram transport — long-polls the Bot API for updates.
//!
//! Thin wrapper over getUpdates/sendMessage/getFile. Everything
//! Telegram-specific (chat ids, file ids) travels in message metadata so
//! the core stays protocol-agnostic. Telegram sessions authenticate with
//! the bot token alone, so the pairing-challenge event never fires here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::transport::event::{AttachmentPayload, InboundMessage, TransportEvent};
use crate::transport::{EventStream, Transport};

/// Consecutive poll failures before the session is reported disconnected.
const MAX_POLL_FAILURES: u32 = 5;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("https://api.telegram.org/file/bot{}/{file_path}", self.bot_token)
    }

    /// Send a text message, trying Markdown first with plain-text fallback
    /// (verdict templates use Markdown emphasis).
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn initialize(&self) -> Result<EventStream, ChannelError> {
        // Auth probe: a bad token should fail session start, not the poll loop.
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            });
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Authenticated);
        let _ = tx.send(TransportEvent::Ready);

        let client = self.client.clone();
        let bot_token = self.bot_token.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let mut failures: u32 = 0;

            tracing::info!("Telegram transport polling for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let data: serde_json::Value = match client.post(&url).json(&body).send().await {
                    Ok(resp) => match resp.json().await {
                        Ok(d) => d,
                        Err(e) => {
                            failures += 1;
                            if poll_failed(&tx, failures, &e.to_string()) {
                                return;
                            }
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                            continue;
                        }
                    },
                    Err(e) => {
                        failures += 1;
                        if poll_failed(&tx, failures, &e.to_string()) {
                            return;
                        }
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };
                failures = 0;

                if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
                    for update in results {
                        if let Some(uid) =
                            update.get("update_id").and_then(serde_json::Value::as_i64)
                        {
                            offset = uid + 1;
                        }

                        let Some(message) = update.get("message") else {
                            continue;
                        };

                        let incoming = parse_message(message);
                        if tx.send(TransportEvent::Message(incoming)).is_err() {
                            tracing::info!("Telegram event stream closed; stopping poll loop");
                            return;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), ChannelError> {
        let chat_id =
            msg.metadata
                .get("chat_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ChannelError::Unavailable {
                    name: "telegram".into(),
                    reason: "no chat_id in message metadata".into(),
                })?;
        self.send_message(chat_id, text).await
    }

    async fn download_attachment(
        &self,
        msg: &InboundMessage,
    ) -> Result<AttachmentPayload, ChannelError> {
        let file_id =
            msg.metadata
                .get("file_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ChannelError::DownloadFailed {
                    name: "telegram".into(),
                    reason: "no file_id in message metadata".into(),
                })?;
        let mime_type = msg
            .metadata
            .get("mime_type")
            .and_then(|v| v.as_str())
            .unwrap_or("application/octet-stream")
            .to_string();

        let resp = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;
        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| download_failed("getFile response missing file_path".into()))?;

        let bytes = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        Ok(AttachmentPayload {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.send_message(recipient, text).await
    }

    async fn teardown(&self) -> Result<(), ChannelError> {
        // The poll loop exits on its own once the event stream is dropped.
        tracing::info!("Telegram transport torn down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Record a poll failure; returns `true` when the loop should stop.
fn poll_failed(
    tx: &tokio::sync::mpsc::UnboundedSender<TransportEvent>,
    failures: u32,
    reason: &str,
) -> bool {
    tracing::warn!(failures, "Telegram poll error: {reason}");
    if failures >= MAX_POLL_FAILURES {
        let _ = tx.send(TransportEvent::Disconnected {
            reason: format!("{failures} consecutive poll failures: {reason}"),
        });
        return true;
    }
    false
}

fn download_failed(reason: String) -> ChannelError {
    ChannelError::DownloadFailed {
        name: "telegram".into(),
        reason,
    }
}

/// Pull the downloadable media object out of a Telegram `message`, if any.
///
/// Any media kind counts: documents, videos, audio, voice notes and
/// animations carry their own `file_id`; photos arrive as an array of
/// sizes, smallest first, so the largest size is taken.
fn media_object(message: &serde_json::Value) -> Option<&serde_json::Value> {
    for field in ["document", "video", "audio", "voice", "animation"] {
        if let Some(obj) = message.get(field) {
            return Some(obj);
        }
    }
    message
        .get("photo")
        .and_then(serde_json::Value::as_array)
        .and_then(|sizes| sizes.last())
}

/// Build an [`InboundMessage`] from one Telegram `message` object.
///
/// Text comes from `text` or `caption` (media carry their keyword in the
/// caption). Attachment presence maps to any downloadable media field.
fn parse_message(message: &serde_json::Value) -> InboundMessage {
    let body = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let id = message
        .get("message_id")
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let received_at = message
        .get("date")
        .and_then(serde_json::Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let media = media_object(message);
    let mut metadata = serde_json::json!({ "chat_id": chat_id });
    if let Some(obj) = media {
        if let Some(file_id) = obj.get("file_id").and_then(serde_json::Value::as_str) {
            metadata["file_id"] = serde_json::Value::String(file_id.to_string());
        }
        if let Some(mime) = obj.get("mime_type").and_then(serde_json::Value::as_str) {
            metadata["mime_type"] = serde_json::Value::String(mime.to_string());
        }
    }

    InboundMessage::new(id, body)
        .with_attachment(media.is_some())
        .with_received_at(received_at)
        .with_metadata(metadata)
}

// ── Tests ───────────────────────────────────────────────────────────
