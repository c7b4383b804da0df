//! Result formatter — renders a verdict into the user-facing reply.

use std::fmt::Write;

use crate::scan::verdict::ScanVerdict;

/// Categories that are always shown, zero-defaulted, in this order.
const ALWAYS_SHOWN: &[(&str, &str)] = &[
    ("undetected", "✅ Undetected"),
    ("suspicious", "⚠️ Suspicious"),
    ("malicious", "❌ Malicious"),
    ("harmless", "🟢 Harmless"),
];

/// Render the fixed reply template. Infallible and pure.
pub fn render_verdict(verdict: &ScanVerdict) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "*Scan results:*");
    let _ = writeln!(out, "🛡️ Antivirus engines: {}", verdict.total_engines);
    let _ = writeln!(
        out,
        "☠️ Flagged as malicious by: {} engines",
        verdict.malicious
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "📊 Breakdown:");
    for (category, label) in ALWAYS_SHOWN {
        let _ = writeln!(out, "{label}: {}", verdict.count(category));
    }
    // Any remaining non-zero category (e.g. timeout) is appended so the
    // shown counts still account for the engine total.
    for (category, count) in &verdict.stats {
        if *count > 0 && !ALWAYS_SHOWN.iter().any(|(c, _)| c == category) {
            let _ = writeln!(out, "▫️ {category}: {count}");
        }
    }
    let _ = writeln!(out);
    let _ = write!(out, "🔗 Full report: {}", verdict.report_link);
    out
}
