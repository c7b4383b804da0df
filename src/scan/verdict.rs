//! Verdict normalization — per-engine stats into a stable summary.

use std::collections::BTreeMap;

use serde::Serialize;

/// Per-category engine counts as reported by the scanning service.
///
/// Categories are open-ended (`malicious`, `suspicious`, `harmless`,
/// `undetected`, `timeout`, ...). A category absent from the remote payload
/// reads as zero, never as an error.
pub type EngineStats = BTreeMap<String, u64>;

/// Link text used when the remote payload carries no content hash.
pub const REPORT_LINK_UNAVAILABLE: &str = "(report link unavailable)";

/// Normalized scan outcome. Immutable once constructed; consumed once by
/// the result formatter.
#[derive(Debug, Clone, Serialize)]
pub struct ScanVerdict {
    /// Engines that flagged the payload as malicious.
    pub malicious: u64,
    /// Total engines consulted — the sum over all reported categories,
    /// known or not.
    pub total_engines: u64,
    /// Full category breakdown.
    pub stats: EngineStats,
    /// Dereferenceable report link, or [`REPORT_LINK_UNAVAILABLE`].
    pub report_link: String,
}

impl ScanVerdict {
    /// Build a verdict from raw remote stats and an optional content hash.
    pub fn from_stats(stats: EngineStats, sha256: Option<&str>) -> Self {
        // Saturating fold: remote counts are untrusted input and must not
        // be able to panic a handler task via overflow.
        let total_engines = stats
            .values()
            .fold(0u64, |acc, count| acc.saturating_add(*count));
        let malicious = stats.get("malicious").copied().unwrap_or(0);
        let report_link = match sha256 {
            Some(hash) if !hash.is_empty() => {
                format!("https://www.virustotal.com/gui/file/{hash}")
            }
            _ => REPORT_LINK_UNAVAILABLE.to_string(),
        };
        Self {
            malicious,
            total_engines,
            stats,
            report_link,
        }
    }

    /// Count for a category, zero when absent.
    pub fn count(&self, category: &str) -> u64 {
        self.stats.get(category).copied().unwrap_or(0)
    }
}
