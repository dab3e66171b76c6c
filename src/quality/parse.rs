//! Tolerant extraction of a JSON object from free-form model output.
//!
//! Models asked for "JSON and nothing else" still wrap the object in prose,
//! Markdown fences, or trailing commentary. This module's single contract:
//! given text possibly wrapping a JSON object, attempt structured
//! extraction, else signal [`ParseFailed`]. Interpretation of the extracted
//! object lives elsewhere so each side can be tested independently.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// No parseable JSON object was found in the text.
///
/// A data condition, not a fatal error: callers recover with a conservative
/// fallback rather than propagating this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no parseable JSON object found in response text")]
pub struct ParseFailed;

/// Extract the first balanced, parseable JSON object from `text`.
///
/// Fenced blocks are searched first, then the raw text. Balanced-brace
/// scanning is string-aware, so braces inside JSON string values do not
/// truncate the candidate.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, ParseFailed> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Static pattern; compilation cannot fail.
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid fence pattern")
    });

    for capture in fence.captures_iter(text) {
        if let Some(inner) = capture.get(1) {
            if let Some(value) = scan_for_object(inner.as_str()) {
                return Ok(value);
            }
        }
    }

    scan_for_object(text).ok_or(ParseFailed)
}

/// Try every `{` as a candidate start until one balanced substring parses.
fn scan_for_object(text: &str) -> Option<serde_json::Value> {
    for (start, _) in text.match_indices('{') {
        let candidate = &text[start..];
        if let Some(end) = find_matching_brace(candidate) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate[..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Index of the brace closing the object that opens at byte 0.
///
/// Tracks string state so `{` / `}` inside quoted values are ignored.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0u32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_object() {
        let value = extract_json_object(r#"{"score": 80}"#).unwrap();
        assert_eq!(value["score"], 80);
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let text = "Here is my assessment:\n{\"score\": 72}\nLet me know if you need more.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 72);
    }

    #[test]
    fn test_fenced_object() {
        let text = "Sure!\n```json\n{\"score\": 65, \"issues\": []}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 65);
    }

    #[test]
    fn test_fence_without_language_tag() {
        let text = "```\n{\"score\": 50}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 50);
    }

    #[test]
    fn test_braces_inside_strings_do_not_truncate() {
        let text = r#"{"description": "use {placeholders} sparingly", "score": 90}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 90);
    }

    #[test]
    fn test_nested_objects() {
        let text = r#"noise {"outer": {"inner": 1}, "score": 10} trailing"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["outer"]["inner"], 1);
    }

    #[test]
    fn test_skips_unparseable_candidate() {
        // The first balanced candidate is not valid JSON; the second is.
        let text = r#"{not json} and then {"score": 5}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["score"], 5);
    }

    #[test]
    fn test_plain_text_fails() {
        assert_eq!(extract_json_object("no json here at all"), Err(ParseFailed));
    }

    #[test]
    fn test_truncated_object_fails() {
        assert_eq!(
            extract_json_object(r#"{"score": 80, "issues": ["#),
            Err(ParseFailed)
        );
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(extract_json_object(""), Err(ParseFailed));
    }

    #[test]
    fn test_json_array_is_not_an_object() {
        assert_eq!(extract_json_object("[1, 2, 3]"), Err(ParseFailed));
    }
}
