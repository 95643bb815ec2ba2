//! Post-processing of instrument responses into flow values.

use super::gateway::ScpiResponse;
use crate::value::Value;

/// Removes one trailing `\r\n` terminator, if present.
pub fn strip_line_terminator(text: &str) -> &str {
    text.strip_suffix("\r\n").unwrap_or(text)
}

/// Recognizes an SCPI quoted string and collapses doubled interior quotes.
///
/// Returns `None` for anything that is not a well-formed quoted string, including
/// an interior quote that is not doubled; such payloads are then parsed as numbers or
/// taken verbatim.
pub fn unescape_quoted(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.next() != Some('"') {
                return None;
            }
        }
        result.push(c);
    }
    Some(result)
}

/// Inverse of [`unescape_quoted`].
pub fn escape_quoted(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 2);
    result.push('"');
    for c in text.chars() {
        if c == '"' {
            result.push('"');
        }
        result.push(c);
    }
    result.push('"');
    result
}

/// Interprets a textual response: quoted string, then integer, then float, then raw text.
pub fn parse_text(text: &str) -> Value {
    let text = strip_line_terminator(text);
    if let Some(unquoted) = unescape_quoted(text) {
        return Value::String(unquoted);
    }
    if let Ok(i) = text.parse::<i32>() {
        return Value::Integer(i);
    }
    if let Ok(n) = text.parse::<f64>() {
        return Value::Number(n);
    }
    Value::String(text.to_string())
}

/// Converts a successful response into a value. Blob payloads bypass all text processing.
pub fn parse_response(response: &ScpiResponse) -> Value {
    if response.is_blob {
        return Value::Blob(response.payload.clone());
    }
    parse_text(&String::from_utf8_lossy(&response.payload))
}
