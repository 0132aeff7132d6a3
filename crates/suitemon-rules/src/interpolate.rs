use crate::{accessor, operator};
use serde_json::Value;

/// Substitutes `{{path}}` tokens in a rule's expected value with fields of
/// the event under evaluation.
///
/// A token's path is trimmed and may not contain `}`. Paths resolving to
/// absent or null become the empty string. Text without a well-formed token
/// passes through unchanged.
pub fn interpolate(template: &str, event: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) if !after[..end].contains('}') => {
                let path = after[..end].trim();
                if let Some(value) = accessor::lookup(event, path) {
                    if !value.is_null() {
                        out.push_str(&operator::stringify(value));
                    }
                }
                rest = &after[end + 2..];
            }
            _ => {
                // Unterminated or malformed token: emit the braces literally.
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
