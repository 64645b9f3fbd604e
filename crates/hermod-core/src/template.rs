//! Deep template rendering for subscriber-supplied structures.
//!
//! Replaces `{{dotted.path}}` tokens inside arbitrarily nested JSON against
//! an event context. Rendering is total: unknown paths resolve to the empty
//! string and malformed tokens are left as literal text, so a bad template
//! can never abort action execution.

use serde_json::Value;

/// Renders a value tree against a context, preserving shape.
///
/// Arrays and objects are traversed recursively; string leaves are rendered
/// with [`render_str`]; every other leaf passes through unchanged.
pub fn render(value: &Value, ctx: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|item| render(item, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter().map(|(key, item)| (key.clone(), render(item, ctx))).collect(),
        ),
        Value::String(text) => Value::String(render_str(text, ctx)),
        other => other.clone(),
    }
}

/// Renders a single string, substituting every `{{path}}` occurrence.
///
/// A token without a closing `}}` is emitted literally. Paths are trimmed and
/// split on `.`; each segment indexes an object by key or an array by
/// numeric position. Missing segments resolve to the empty string.
pub fn render_str(text: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let path = after_open[..end].trim();
                out.push_str(&lookup_text(ctx, path));
                rest = &after_open[end + 2..];
            },
            None => {
                // Unterminated token: keep the remainder as literal text.
                out.push_str(&rest[start..]);
                return out;
            },
        }
    }

    out.push_str(rest);
    out
}

/// Walks a dot-separated path and renders the result as text.
fn lookup_text(ctx: &Value, path: &str) -> String {
    let mut current = ctx;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(next) => next,
                None => return String::new(),
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(next) => next,
                None => return String::new(),
            },
            _ => return String::new(),
        };
    }

    match current {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
