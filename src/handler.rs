//! Message handling boundary.
//!
//! Every scan or transport failure is absorbed here: logged, then turned
//! into a category-level user reply. Nothing propagates out of `handle`,
//! so a bad message can never take the session down.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{ChannelError, ScanError};
use crate::filter;
use crate::format;
use crate::scan::ScanOrchestrator;
use crate::transport::{InboundMessage, Transport};

/// Acknowledgement sent before the scan starts.
const ACK_TEXT: &str = "🔍 Analyzing file, please wait...";

/// Handles one inbound message end to end.
pub struct MessageHandler {
    orchestrator: ScanOrchestrator,
    activation_words: Vec<String>,
}

impl MessageHandler {
    pub fn new(orchestrator: ScanOrchestrator, activation_words: Vec<String>) -> Self {
        Self {
            orchestrator,
            activation_words,
        }
    }

    /// Gate, scan, reply. Infallible by design.
    pub async fn handle(&self, transport: Arc<dyn Transport>, msg: InboundMessage) {
        if !filter::should_scan(&msg.body, msg.has_attachment, &self.activation_words) {
            debug!(id = %msg.id, "Message did not activate a scan");
            return;
        }

        info!(id = %msg.id, "Activation matched; scanning attachment");

        // Best-effort ack; a failed ack is no reason to skip the scan.
        if let Err(e) = transport.reply(&msg, ACK_TEXT).await {
            warn!(id = %msg.id, error = %e, "Failed to send scan acknowledgement");
        }

        let reply = match self.scan(transport.as_ref(), &msg).await {
            Ok(text) => text,
            Err(text) => text,
        };

        if let Err(e) = transport.reply(&msg, &reply).await {
            error!(id = %msg.id, error = %e, "Failed to deliver scan reply");
        }
    }

    /// Run the scan; on failure, returns the user-facing reply text.
    async fn scan(
        &self,
        transport: &dyn Transport,
        msg: &InboundMessage,
    ) -> Result<String, String> {
        let payload = transport.download_attachment(msg).await.map_err(|e| {
            error!(id = %msg.id, error = %e, "Attachment download failed");
            channel_reply(&e)
        })?;

        let verdict = self
            .orchestrator
            .submit_and_scan(&payload.bytes, &payload.mime_type, &msg.id)
            .await
            .map_err(|e| {
                error!(id = %msg.id, error = %e, "Scan failed");
                scan_reply(&e)
            })?;

        Ok(format::render_verdict(&verdict))
    }
}

/// User-facing reply for a scan failure. Names the failure category only;
/// internal detail stays in the logs.
fn scan_reply(err: &ScanError) -> String {
    let reason = match err {
        ScanError::Storage(_) => "a local storage failure",
        ScanError::PayloadTooLarge { .. } => "the file exceeds the size limit",
        ScanError::RemoteProtocol(_) => "the scanning service returned an unexpected response",
        ScanError::RemoteTransport(_) => "the scanning service is unreachable",
    };
    format!("❌ Could not analyze the file: {reason}.")
}

/// User-facing reply for a transport failure during handling.
fn channel_reply(_err: &ChannelError) -> String {
    "❌ Could not analyze the file: the attachment could not be retrieved.".to_string()
}
