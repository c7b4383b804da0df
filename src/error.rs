//! Error types for Scan Sentry.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by a single scan attempt.
///
/// None of these are retried inside the orchestrator; the message handler
/// converts each kind into a category-level user reply.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes exceeds the {limit} byte ceiling")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Malformed response from scanning service: {0}")]
    RemoteProtocol(String),

    #[error("Failed to reach scanning service: {0}")]
    RemoteTransport(String),
}

/// Chat-transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send reply on transport {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download attachment on transport {name}: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Transport {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}
