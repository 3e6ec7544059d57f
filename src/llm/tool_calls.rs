//! Recovery of tool-call requests from free model text.
//!
//! Models without native tool calling are told to answer with a bare
//! `{"tool_calls":[...]}` object. Well-behaved models do; others wrap it in
//! prose. Anything else is a plain answer.

use crate::llm::models::LlmToolCall;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static TOOL_CALLS_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{\s*"tool_calls"\s*:\s*\["#).expect("valid regex"));

static TOOL_CALLS_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\s*\}").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct ToolCallEnvelope {
    tool_calls: Vec<LlmToolCall>,
}

/// Extract tool-call requests from model output.
///
/// Returns `None` when the text does not encode a tool call, including text
/// that only looks like one.
pub fn extract_tool_calls(text: &str) -> Option<Vec<LlmToolCall>> {
    if let Some(calls) = parse_whole(text) {
        debug!("Tool calls parsed from bare JSON: {}", calls.len());
        return Some(calls);
    }

    let calls = scan_embedded(text)?;
    debug!("Tool calls recovered from surrounding prose: {}", calls.len());
    Some(calls)
}

fn parse_whole(text: &str) -> Option<Vec<LlmToolCall>> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    if value.get("tool_calls").is_none() {
        return None;
    }
    serde_json::from_value::<ToolCallEnvelope>(value).ok().map(|e| e.tool_calls)
}

// Shortest candidate first, for every opening anchor in order.
fn scan_embedded(text: &str) -> Option<Vec<LlmToolCall>> {
    for open in TOOL_CALLS_OPEN.find_iter(text) {
        let tail = &text[open.start()..];
        for close in TOOL_CALLS_CLOSE.find_iter(tail) {
            let candidate = &tail[..close.end()];
            if let Ok(envelope) = serde_json::from_str::<ToolCallEnvelope>(candidate) {
                return Some(envelope.tool_calls);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PARIS_CALL: &str = r#"{"tool_calls":[{"id":"toolcall_1","function":{"name":"get_weather","arguments":"{\"city\":\"Paris\"}"}}]}"#;

    #[test]
    fn test_bare_json_preserves_fields() {
        let calls = extract_tool_calls(PARIS_CALL).unwrap();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolcall_1");
        assert_eq!(calls[0].name(), "get_weather");
        assert_eq!(calls[0].function.arguments, json!("{\"city\":\"Paris\"}"));
    }

    #[test]
    fn test_bare_json_with_whitespace() {
        let text = format!("\n  {}  \n", PARIS_CALL);
        assert_eq!(extract_tool_calls(&text).unwrap()[0].id, "toolcall_1");
    }

    #[test]
    fn test_multiple_calls_keep_order() {
        let text = r#"{"tool_calls":[
            {"id":"a","function":{"name":"get_weather","arguments":"{\"city\":\"Paris\"}"}},
            {"id":"b","function":{"name":"get_weather","arguments":"{\"city\":\"Tokyo\"}"}}
        ]}"#;

        let calls = extract_tool_calls(text).unwrap();
        let ids: Vec<_> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(extract_tool_calls("В Париже сейчас солнечно.").is_none());
        assert!(extract_tool_calls("").is_none());
    }

    #[test]
    fn test_json_without_tool_calls_key_yields_nothing() {
        assert!(extract_tool_calls(r#"{"answer":"sunny"}"#).is_none());
        assert!(extract_tool_calls(r#"{"calls":[{"id":"a"}]}"#).is_none());
    }

    #[test]
    fn test_prose_around_json_is_ignored() {
        let text = format!(
            "Sure! I will look that up for you.\n{}\nLet me know if you need anything else.",
            PARIS_CALL
        );

        let calls = extract_tool_calls(&text).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "toolcall_1");
        assert_eq!(calls[0].function.arguments, json!("{\"city\":\"Paris\"}"));
    }

    #[test]
    fn test_prose_with_trailing_brackets() {
        let text = format!("{} [done] }}", PARIS_CALL);
        assert_eq!(extract_tool_calls(&text).unwrap()[0].name(), "get_weather");
    }

    #[test]
    fn test_structured_arguments_accepted() {
        let text = r#"{"tool_calls":[{"id":"x","function":{"name":"get_weather","arguments":{"city":"Oslo"}}}]}"#;
        let calls = extract_tool_calls(text).unwrap();
        assert_eq!(calls[0].parsed_arguments().unwrap()["city"], "Oslo");
    }

    #[test]
    fn test_missing_id_is_synthesized() {
        let text = r#"Here: {"tool_calls":[{"function":{"name":"get_weather","arguments":"{}"}}]}"#;
        let calls = extract_tool_calls(text).unwrap();
        assert!(calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_lookalike_is_not_a_tool_call() {
        let text = r#"I would call {"tool_calls": [get_weather(Paris)]} but I won't."#;
        assert!(extract_tool_calls(text).is_none());
    }

    #[test]
    fn test_truncated_json_is_not_a_tool_call() {
        let text = r#"{"tool_calls":[{"id":"a","function":{"name":"get_weather""#;
        assert!(extract_tool_calls(text).is_none());
    }
}
