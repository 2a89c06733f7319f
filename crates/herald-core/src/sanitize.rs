//! Body text sanitization applied before any editor injection.

/// Remove every character outside the Basic Multilingual Plane.
///
/// The CMS storage layer truncates content at the first supplementary-plane
/// character (emoji and other pictographs), so these must never reach the form.
pub fn sanitize_body(body: &str) -> String {
    body.chars().filter(|c| (*c as u32) <= 0xFFFF).collect()
}

/// True if `body` would be changed by [`sanitize_body`].
pub fn needs_sanitizing(body: &str) -> bool {
    body.chars().any(|c| (c as u32) > 0xFFFF)
}
