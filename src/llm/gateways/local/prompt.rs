//! Prompt construction for models that only consume a single text prompt.

use crate::error::{AssistantError, Result};
use crate::llm::models::{LlmMessage, MessageRole};
use crate::llm::tools::ToolDescriptor;
use serde_json::json;
use tracing::debug;

/// Turn formatting understood natively by a family of models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTemplate {
    /// `<|im_start|>role ... <|im_end|>` (Qwen and friends)
    ChatMl,
    /// `<|start_header_id|>role<|end_header_id|> ... <|eot_id|>`
    Llama3,
}

impl ChatTemplate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "chatml" => Some(Self::ChatMl),
            "llama3" => Some(Self::Llama3),
            _ => None,
        }
    }

    /// Render the conversation, ending with an open assistant turn.
    ///
    /// Like most native templates, a system message is only accepted first.
    pub fn render(&self, messages: &[LlmMessage]) -> Result<String> {
        if let Some(pos) = messages.iter().skip(1).position(|m| m.role == MessageRole::System) {
            return Err(AssistantError::TemplateError(format!(
                "system message at position {} must be at the beginning of the conversation",
                pos + 1
            )));
        }

        let mut prompt = String::new();
        match self {
            Self::ChatMl => {
                for msg in messages {
                    prompt.push_str(&format!(
                        "<|im_start|>{}\n{}<|im_end|>\n",
                        msg.role.as_str(),
                        turn_body(msg)?
                    ));
                }
                prompt.push_str("<|im_start|>assistant\n");
            }
            Self::Llama3 => {
                prompt.push_str("<|begin_of_text|>");
                for msg in messages {
                    let role = match msg.role {
                        MessageRole::Tool => "ipython",
                        other => other.as_str(),
                    };
                    prompt.push_str(&format!(
                        "<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>",
                        role,
                        turn_body(msg)?
                    ));
                }
                prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
            }
        }

        Ok(prompt)
    }
}

/// Fixed role-tagged rendering used when no native template applies.
///
/// All system content is merged into one leading block.
pub fn render_role_tagged(messages: &[LlmMessage]) -> Result<String> {
    let system = messages
        .iter()
        .filter(|m| m.role == MessageRole::System && !m.content.is_empty())
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut prompt = format!("<|system|>\n{}\n", system);
    for msg in messages.iter().filter(|m| m.role != MessageRole::System) {
        prompt.push_str(&format!("<|{}|>\n{}\n", msg.role.as_str(), turn_body(msg)?));
    }
    prompt.push_str("<|assistant|>\n");

    Ok(prompt)
}

/// Try the model's own template first, then the role-tagged scheme.
pub fn render_prompt(template: Option<ChatTemplate>, messages: &[LlmMessage]) -> Result<String> {
    let native = match template {
        Some(template) => template.render(messages),
        None => Err(AssistantError::TemplateError("model has no chat template".to_string())),
    };

    match native {
        Ok(prompt) => Ok(prompt),
        Err(e) => {
            debug!("Falling back to role-tagged prompt: {}", e);
            render_role_tagged(messages)
        }
    }
}

// Assistant turns that called tools are replayed in the mandated JSON shape.
fn turn_body(msg: &LlmMessage) -> Result<String> {
    let Some(calls) = msg.requested_tool_calls() else {
        return Ok(msg.content.clone());
    };

    let calls: Vec<_> = calls
        .iter()
        .map(|call| {
            let arguments = match &call.function.arguments {
                serde_json::Value::String(raw) => raw.clone(),
                other => other.to_string(),
            };
            json!({
                "id": call.id,
                "function": {"name": call.function.name, "arguments": arguments}
            })
        })
        .collect();
    let encoded = serde_json::to_string(&json!({ "tool_calls": calls }))?;

    if msg.content.is_empty() {
        Ok(encoded)
    } else {
        Ok(format!("{}\n{}", msg.content, encoded))
    }
}

/// System instruction that emulates tool calling through plain text
pub fn tool_instruction(tools: &[ToolDescriptor]) -> Result<String> {
    let schemas = serde_json::to_string_pretty(tools)?;

    Ok(format!(
        "You can call the following tools, each described by its JSON schema:\n\
         {schemas}\n\n\
         When a tool is needed, reply with ONLY the following JSON, with no text before or after it \
         and no markdown fences:\n\
         {{\"tool_calls\":[{{\"id\":\"toolcall_1\",\"function\":{{\"name\":\"<tool name>\",\"arguments\":\"<JSON-encoded arguments>\"}}}}]}}\n\
         The \"arguments\" value is a string holding a JSON object, for example \"{{\\\"city\\\":\\\"Paris\\\"}}\".\n\
         Give every call an id that has not been used earlier in this conversation.\n\
         When no tool is needed, answer in plain text."
    ))
}

/// Merge an extra instruction into the leading system message.
pub fn with_instruction(messages: &[LlmMessage], instruction: Option<&str>) -> Vec<LlmMessage> {
    let mut merged = messages.to_vec();
    let Some(instruction) = instruction else {
        return merged;
    };

    match merged.first_mut() {
        Some(first) if first.role == MessageRole::System => {
            if !first.content.is_empty() {
                first.content.push_str("\n\n");
            }
            first.content.push_str(instruction);
        }
        _ => merged.insert(0, LlmMessage::system(instruction)),
    }

    merged
}

/// Drop the prompt when the backend echoes it before the continuation.
pub fn strip_prompt_echo<'a>(prompt: &str, generated: &'a str) -> &'a str {
    if let Some(continuation) = generated.strip_prefix(prompt) {
        return continuation;
    }
    generated.trim_start().strip_prefix(prompt.trim_start()).unwrap_or(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::LlmToolCall;
    use crate::llm::tools::{LlmTool, WeatherTool};

    fn conversation() -> Vec<LlmMessage> {
        vec![LlmMessage::system("Be brief."), LlmMessage::user("Погода в Осло?")]
    }

    #[test]
    fn test_template_from_name() {
        assert_eq!(ChatTemplate::from_name("chatml"), Some(ChatTemplate::ChatMl));
        assert_eq!(ChatTemplate::from_name(" Llama3 "), Some(ChatTemplate::Llama3));
        assert_eq!(ChatTemplate::from_name("alpaca"), None);
    }

    #[test]
    fn test_chatml_render() {
        let prompt = ChatTemplate::ChatMl.render(&conversation()).unwrap();

        assert_eq!(
            prompt,
            "<|im_start|>system\nBe brief.<|im_end|>\n\
             <|im_start|>user\nПогода в Осло?<|im_end|>\n\
             <|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_llama3_render_ends_with_open_assistant_turn() {
        let prompt = ChatTemplate::Llama3.render(&conversation()).unwrap();

        assert!(prompt.starts_with("<|begin_of_text|><|start_header_id|>system"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn test_native_template_rejects_late_system_message() {
        let mut messages = conversation();
        messages.push(LlmMessage::system("Another rule"));

        match ChatTemplate::ChatMl.render(&messages) {
            Err(AssistantError::TemplateError(_)) => {}
            other => panic!("Expected TemplateError, got {:?}", other),
        }
    }

    #[test]
    fn test_role_tagged_merges_system_blocks() {
        let messages = vec![
            LlmMessage::system("First rule"),
            LlmMessage::user("Hi"),
            LlmMessage::system("Second rule"),
        ];

        let prompt = render_role_tagged(&messages).unwrap();

        assert_eq!(
            prompt,
            "<|system|>\nFirst rule\n\nSecond rule\n<|user|>\nHi\n<|assistant|>\n"
        );
        assert_eq!(prompt.matches("<|system|>").count(), 1);
    }

    #[test]
    fn test_role_tagged_without_system_still_has_block() {
        let prompt = render_role_tagged(&[LlmMessage::user("Hi")]).unwrap();
        assert!(prompt.starts_with("<|system|>\n"));
        assert!(prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_render_prompt_prefers_native_template() {
        let prompt = render_prompt(Some(ChatTemplate::ChatMl), &conversation()).unwrap();
        assert!(prompt.starts_with("<|im_start|>system"));
    }

    #[test]
    fn test_render_prompt_falls_back_without_template() {
        let prompt = render_prompt(None, &conversation()).unwrap();
        assert!(prompt.starts_with("<|system|>"));
    }

    #[test]
    fn test_render_prompt_falls_back_when_template_fails() {
        let mut messages = conversation();
        messages.push(LlmMessage::system("Late rule"));

        let prompt = render_prompt(Some(ChatTemplate::ChatMl), &messages).unwrap();

        assert!(prompt.starts_with("<|system|>\nBe brief.\n\nLate rule\n"));
        assert!(!prompt.contains("<|im_start|>"));
    }

    #[test]
    fn test_tool_turns_are_replayed() {
        let call =
            LlmToolCall::new("toolcall_1", "get_weather", serde_json::json!({"city": "Oslo"}));
        let messages = vec![
            LlmMessage::user("Погода в Осло?"),
            LlmMessage::assistant_with_tool_calls("", vec![call.clone()]),
            LlmMessage::tool_result(&call, "Холодно."),
        ];

        let prompt = render_role_tagged(&messages).unwrap();

        let replayed = prompt
            .split("<|assistant|>\n")
            .nth(1)
            .and_then(|block| block.lines().next())
            .unwrap();
        let calls = crate::llm::tool_calls::extract_tool_calls(replayed).unwrap();
        assert_eq!(calls[0].id, "toolcall_1");
        assert_eq!(calls[0].function.arguments, serde_json::json!("{\"city\":\"Oslo\"}"));
        assert!(prompt.contains("<|tool|>\nХолодно.\n"));
    }

    #[test]
    fn test_tool_instruction_embeds_schema_and_shape() {
        let tool = WeatherTool::new("key").unwrap();
        let instruction = tool_instruction(&[tool.descriptor()]).unwrap();

        assert!(instruction.contains("\"get_weather\""));
        assert!(instruction.contains("\"required\""));
        assert!(instruction.contains(
            r#"{"tool_calls":[{"id":"toolcall_1","function":{"name":"<tool name>","arguments":"<JSON-encoded arguments>"}}]}"#
        ));
        assert!(instruction.contains("plain text"));
        assert!(instruction.contains("has not been used earlier"));
    }

    #[test]
    fn test_with_instruction_appends_to_system() {
        let merged = with_instruction(&conversation(), Some("Use tools."));

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "Be brief.\n\nUse tools.");
    }

    #[test]
    fn test_with_instruction_inserts_system_when_missing() {
        let merged = with_instruction(&[LlmMessage::user("Hi")], Some("Use tools."));

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].role, MessageRole::System);
        assert_eq!(merged[0].content, "Use tools.");
    }

    #[test]
    fn test_with_instruction_none_is_identity() {
        assert_eq!(with_instruction(&conversation(), None), conversation());
    }

    #[test]
    fn test_strip_prompt_echo() {
        assert_eq!(strip_prompt_echo("PROMPT", "PROMPTanswer"), "answer");
        assert_eq!(strip_prompt_echo("PROMPT", "answer"), "answer");
        assert_eq!(strip_prompt_echo("\nPROMPT", "PROMPT answer"), " answer");
    }
}
