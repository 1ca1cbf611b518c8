//! Compatibility shim for string-template conditions.
//!
//! INSECURE: this is not a predicate evaluator. A template passes whenever the
//! caller id shows up in the text after substitution, which is true for any
//! template that mentions the placeholder at all, whatever the surrounding
//! SQL says. Kept only so existing permission rows keep their behavior;
//! new rules should carry a structured [`super::Predicate`].

/// Marker for "the current caller" inside legacy templates.
pub const CALLER_PLACEHOLDER: &str = "auth.uid()";

/// Substitute the caller id for the placeholder and test for its presence.
pub fn evaluate_template(template: &str, caller_id: &str) -> bool {
    if caller_id.is_empty() {
        return false;
    }
    let substituted = template.replace(CALLER_PLACEHOLDER, caller_id);
    substituted.contains(caller_id)
}
