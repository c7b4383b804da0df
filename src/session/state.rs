//! Session connectivity state.

use serde::Serialize;

/// State of the chat session. Written only by the supervisor; everyone
/// else holds a read-only watch receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Transport is being initialized.
    Starting,
    /// A pairing challenge was issued and awaits completion.
    Authenticating,
    /// Session is connected and exchanging messages.
    Ready,
    /// Session lost connectivity; a restart is pending.
    Disconnected,
}

impl SessionState {
    /// Reduced connected/disconnected view for the liveness reporter.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
        };
        write!(f, "{s}")
    }
}
