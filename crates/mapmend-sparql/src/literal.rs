//! Literal rendering and escaping for compiled statements.

use mapmend_core::FieldValue;

/// Escape a string for embedding in a double-quoted SPARQL literal.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a field value as a SPARQL literal: booleans and integers as bare
/// typed tokens, everything else as a quoted, escaped string.
pub fn literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Flag(b) => b.to_string(),
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Text(s) => format!("\"{}\"", escape_text(s)),
    }
}
