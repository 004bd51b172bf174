//! JSON extraction for LLM responses.
//!
//! Model output frequently wraps the payload in markdown fences or surrounds
//! it with prose. The helpers here locate the JSON value without assuming a
//! particular wrapping:
//!
//! 1. ```` ```json ```` fenced block
//! 2. Generic ```` ``` ```` fenced block
//! 3. Content that already starts with `{` or `[`
//! 4. First balanced object or array anywhere in the content
//!
//! # Example
//!
//! ```
//! use qa_forge::utils::json_extraction::extract_json_from_response;
//!
//! let response = "Sure! ```json\n[{\"id\": \"login\"}]\n```";
//! assert_eq!(extract_json_from_response(response), "[{\"id\": \"login\"}]");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Result of a JSON extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// Successfully extracted valid JSON
    Success(String),
    /// JSON started but never closed
    Truncated {
        partial_json: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    /// No JSON-like content found
    NotFound,
}

impl JsonExtractionResult {
    /// Returns true if JSON was successfully extracted
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Converts the result to a `Result`, using `content` for the preview
    /// when nothing was found.
    pub fn into_result_with_context(self, content: &str) -> Result<String, JsonExtractionError> {
        match self {
            JsonExtractionResult::Success(json) => Ok(json),
            JsonExtractionResult::Truncated {
                partial_json,
                unclosed_braces,
                unclosed_brackets,
            } => Err(JsonExtractionError::Truncated {
                partial_preview: preview(&partial_json, 100),
                unclosed_braces,
                unclosed_brackets,
            }),
            JsonExtractionResult::NotFound => Err(JsonExtractionError::NotFound {
                content_preview: preview(content.trim(), 100),
            }),
        }
    }
}

/// Depth bookkeeping for a (possibly incomplete) JSON fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonStructureAnalysis {
    pub unclosed_braces: usize,
    pub unclosed_brackets: usize,
    pub in_string: bool,
    pub json_start: Option<usize>,
}

/// Scans `s` and reports how many braces/brackets remain open.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut json_start = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => {
                json_start.get_or_insert(i);
                if c == '{' {
                    braces += 1;
                } else {
                    brackets += 1;
                }
            }
            '}' if !in_string => braces -= 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: braces.max(0) as usize,
        unclosed_brackets: brackets.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Returns the byte index of the delimiter closing the one at the start of `s`.
///
/// `s` must start with `{` or `[`. String literals and escapes are honoured.
pub fn find_matching_close(s: &str) -> Option<usize> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn fenced_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```([A-Za-z]*)[ \t]*\n?([\s\S]*?)\n?```").expect("fence regex is valid")
    })
}

/// Extracts the body of the first fenced code block, preferring `json` fences.
pub fn extract_from_code_block(content: &str) -> Option<String> {
    let mut generic = None;
    for caps in fenced_block_regex().captures_iter(content) {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = caps.get(2)?.as_str().trim().to_string();
        if lang.eq_ignore_ascii_case("json") {
            return Some(body);
        }
        if generic.is_none() {
            generic = Some(body);
        }
    }
    generic
}

/// Returns the balanced JSON value starting at `start`, if it parses.
fn balanced_value_at(content: &str, start: usize) -> Option<String> {
    let slice = &content[start..];
    let end = find_matching_close(slice)?;
    let candidate = &slice[..=end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .map(|_| candidate.to_string())
}

/// Attempts to extract JSON from an LLM response.
pub fn try_extract_json_from_response(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    if let Some(block) = extract_from_code_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&block).is_ok() {
            return JsonExtractionResult::Success(block);
        }
        if let Some(start) = block.find(['{', '[']) {
            if let Some(json) = balanced_value_at(&block, start) {
                return JsonExtractionResult::Success(json);
            }
        }
    }

    if serde_json::from_str::<serde_json::Value>(trimmed)
        .map(|v| v.is_object() || v.is_array())
        .unwrap_or(false)
    {
        return JsonExtractionResult::Success(trimmed.to_string());
    }

    for (start, _) in trimmed.match_indices(['{', '[']) {
        if let Some(json) = balanced_value_at(trimmed, start) {
            return JsonExtractionResult::Success(json);
        }
    }

    let analysis = analyze_json_structure(trimmed);
    match analysis.json_start {
        Some(start)
            if analysis.unclosed_braces > 0
                || analysis.unclosed_brackets > 0
                || analysis.in_string =>
        {
            JsonExtractionResult::Truncated {
                partial_json: trimmed[start..].to_string(),
                unclosed_braces: analysis.unclosed_braces,
                unclosed_brackets: analysis.unclosed_brackets,
            }
        }
        _ => JsonExtractionResult::NotFound,
    }
}

/// Extracts JSON content, falling back to the trimmed input.
pub fn extract_json_from_response(content: &str) -> String {
    match try_extract_json_from_response(content) {
        JsonExtractionResult::Success(json) => json,
        JsonExtractionResult::Truncated { partial_json, .. } => partial_json,
        JsonExtractionResult::NotFound => content.trim().to_string(),
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let result = try_extract_json_from_response(r#"  {"tests": []}  "#);
        assert_eq!(result, JsonExtractionResult::Success(r#"{"tests": []}"#.to_string()));
    }

    #[test]
    fn test_json_fence_preferred_over_generic() {
        let content = "```text\nnot json\n```\nthen\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_from_code_block(content), Some("{\"a\": 1}".to_string()));
        assert_eq!(extract_json_from_response(content), "{\"a\": 1}");
    }

    #[test]
    fn test_generic_fence() {
        let content = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json_from_response(content), "[1, 2, 3]");
    }

    #[test]
    fn test_embedded_in_prose() {
        let content = "Here you go: {\"summary\": {\"total\": 1}} hope it helps";
        assert_eq!(
            extract_json_from_response(content),
            "{\"summary\": {\"total\": 1}}"
        );
    }

    #[test]
    fn test_braces_inside_strings() {
        let s = r#"{"note": "use } carefully", "n": 1} trailing"#;
        let end = find_matching_close(s).expect("should find close");
        assert_eq!(&s[..=end], r#"{"note": "use } carefully", "n": 1}"#);
    }

    #[test]
    fn test_truncated_detection() {
        let result = try_extract_json_from_response(r#"{"tests": [{"test_id": "a""#);
        match result {
            JsonExtractionResult::Truncated {
                unclosed_braces,
                unclosed_brackets,
                ..
            } => {
                assert_eq!(unclosed_braces, 2);
                assert_eq!(unclosed_brackets, 1);
            }
            other => panic!("expected truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found() {
        let result = try_extract_json_from_response("I cannot help with that.");
        assert!(!result.is_success());
        let err = result
            .into_result_with_context("I cannot help with that.")
            .unwrap_err();
        assert!(err.to_string().contains("I cannot help"));
    }

    #[test]
    fn test_scalar_is_not_extracted() {
        assert_eq!(
            try_extract_json_from_response("42"),
            JsonExtractionResult::NotFound
        );
    }
}
