//! Configuration, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::filter::DEFAULT_ACTIVATION_WORDS;
use crate::scan::client::DEFAULT_API_BASE;

/// Default payload ceiling: 32 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 32 * 1024 * 1024;

/// Timing and size bounds for one scan attempt.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Payload byte ceiling, checked before any network call.
    pub max_file_bytes: u64,
    /// Wait before the first report fetch (the remote service needs
    /// processing time and exposes no push channel).
    pub initial_poll_delay: Duration,
    /// Wait between subsequent report fetches while the analysis is queued.
    pub poll_interval: Duration,
    /// Overall polling deadline, measured from submission.
    pub poll_deadline: Duration,
    /// Per-request timeout for the multipart upload.
    pub upload_timeout: Duration,
    /// Per-request timeout for a report fetch.
    pub report_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            initial_poll_delay: Duration::from_secs(30),
            poll_interval: Duration::from_secs(15),
            poll_deadline: Duration::from_secs(300),
            upload_timeout: Duration::from_secs(60),
            report_timeout: Duration::from_secs(30),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote scanning service API key.
    pub api_key: SecretString,
    /// Remote scanning service base URL.
    pub api_base: String,
    /// Scan timing and size bounds.
    pub scan: ScanConfig,
    /// Keywords that activate a scan (case-insensitive substrings).
    pub activation_words: Vec<String>,
    /// Operator recipient for pairing-challenge relays.
    pub operator_id: Option<String>,
    /// Delay between session restart attempts.
    pub restart_delay: Duration,
    /// Scratch directory for temporary payload files.
    pub scratch_dir: PathBuf,
    /// Port for the liveness endpoint.
    pub health_port: u16,
}

impl Config {
    /// Build config from environment variables. Only the API key is
    /// required; everything else falls back to a documented default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("SCAN_API_KEY").map_err(|_| ConfigError::MissingRequired {
            key: "SCAN_API_KEY".into(),
            hint: "export SCAN_API_KEY=<file-intelligence service API key>".into(),
        })?;

        let api_base =
            std::env::var("SCAN_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        let activation_words: Vec<String> = match std::env::var("SCAN_ACTIVATION_WORDS") {
            Ok(raw) => {
                let words: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if words.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: "SCAN_ACTIVATION_WORDS".into(),
                        message: "keyword list must contain at least one keyword".into(),
                    });
                }
                words
            }
            Err(_) => DEFAULT_ACTIVATION_WORDS
                .iter()
                .map(|w| w.to_string())
                .collect(),
        };

        let scan = ScanConfig {
            max_file_bytes: env_parse("SCAN_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
            initial_poll_delay: env_secs("SCAN_POLL_DELAY_SECS", 30),
            poll_interval: env_secs("SCAN_POLL_INTERVAL_SECS", 15),
            poll_deadline: env_secs("SCAN_POLL_DEADLINE_SECS", 300),
            upload_timeout: env_secs("SCAN_UPLOAD_TIMEOUT_SECS", 60),
            report_timeout: env_secs("SCAN_REPORT_TIMEOUT_SECS", 30),
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            scan,
            activation_words,
            operator_id: std::env::var("SCAN_OPERATOR_ID").ok().filter(|s| !s.is_empty()),
            restart_delay: env_secs("SCAN_RESTART_DELAY_SECS", 10),
            scratch_dir: std::env::var("SCAN_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./temp_files")),
            health_port: env_parse("SCAN_HEALTH_PORT", 8080),
        })
    }
}

/// Parse an environment variable, falling back to a default on absence
/// or parse failure.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse(key, default_secs))
}
