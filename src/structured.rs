//! Structured payload extraction from untrusted model text
//!
//! Completion text may wrap the JSON object in prose or a ```json fence,
//! be truncated, or contain several brace groups. Extraction never panics
//! and never errors past the caller: it yields a typed value or a reason.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// No parseable JSON object anywhere in the text
    #[error("no JSON object found")]
    NoObject,
    /// An object was found but does not match the expected shape
    #[error("unexpected JSON shape: {0}")]
    Schema(String),
}

/// Extract and deserialize the first JSON object in `text`.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ExtractError> {
    let object = extract_json_object(text).ok_or(ExtractError::NoObject)?;
    serde_json::from_value(Value::Object(object)).map_err(|e| ExtractError::Schema(e.to_string()))
}

/// First JSON object in `text`: a fenced ```json block wins, otherwise the
/// first balanced `{...}` group that parses.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Some(object) = fenced_block(text).and_then(parse_object) {
        return Some(object);
    }

    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| balanced_end(text, start).map(|end| &text[start..end]))
        .find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```json")?;
    let after = &text[start + "```json".len()..];
    let end = after.find("```")?;
    Some(&after[..end])
}

/// Byte offset just past the brace closing the one at `start`; `None` if unbalanced.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}
