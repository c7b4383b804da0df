//! Activation filter — decides whether an inbound message warrants a scan.

/// Default activation keywords (Spanish + English).
pub const DEFAULT_ACTIVATION_WORDS: &[&str] =
    &["revisar", "scan", "analizar", "check", "review", "escanear"];

/// Returns `true` iff the message carries an attachment and its body
/// contains at least one keyword, case-insensitively.
///
/// Matching is substring-based, not tokenized: a keyword embedded inside a
/// longer word still matches. That imprecision is intentional — it keeps the
/// trigger forgiving for users typing in a hurry.
pub fn should_scan(body: &str, has_attachment: bool, keywords: &[String]) -> bool {
    if !has_attachment || body.is_empty() {
        return false;
    }
    let body = body.to_lowercase();
    keywords
        .iter()
        .filter(|w| !w.is_empty())
        .any(|w| body.contains(&w.to_lowercase()))
}
