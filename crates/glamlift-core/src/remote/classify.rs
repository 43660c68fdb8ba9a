//! Transient-error classification by message pattern.
//!
//! The remote API reports failures in several shapes: HTTP status lines,
//! error codes like `maxlag` or `ratelimited` inside a 200 response, and
//! transport-level messages. The retry layer needs one answer from all of
//! them. Classification is a substring match against known transient
//! signatures, applied to the lowercased error text.

/// Signatures of errors worth retrying. Anything not matching is permanent.
const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "503",
    "502",
    "timeout",
    "connection",
    "temporary",
    "try again",
    "server error",
    "maxlag",
    "ratelimited",
];

/// Returns true if the error text matches a known transient signature.
pub fn is_transient(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}
