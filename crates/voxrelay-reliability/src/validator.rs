//! Response validation for LLM output.
//!
//! A reply is valid when, after trimming, it is non-empty, at least 3
//! characters, contains at least one alphanumeric character, and is not one
//! of the literal error-marker strings providers may return in place of a
//! real completion.

/// Literal strings providers are known to return instead of raising an
/// error, which must never be treated as a valid reply.
const ERROR_MARKERS: &[&str] = &[
    "error",
    "[error]",
    "null",
    "undefined",
    "<empty response>",
    "no response",
];

/// Returns whether `text` passes response validation.
pub fn is_valid_response(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < 3 {
        return false;
    }
    if !trimmed.chars().any(|c| c.is_alphanumeric()) {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if ERROR_MARKERS.iter().any(|marker| lower == *marker) {
        return false;
    }
    true
}
