//! Escaping helpers for attribute values and script-embedded JSON.

/// Escape a value for interpolation into a double-quoted HTML attribute.
pub fn attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Escape serialized JSON for embedding inside a `<script>` element.
///
/// Angle brackets and ampersands are replaced with unicode escapes so the
/// payload can never terminate the surrounding script tag; U+2028/U+2029 are
/// valid JSON but not valid JavaScript source, so they are escaped too.
pub fn script_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out
}
