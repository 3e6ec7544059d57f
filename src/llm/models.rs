use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message role in LLM conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// Function part of a tool call: the name to dispatch and its raw arguments.
///
/// `arguments` is kept exactly as the model produced it. Remote backends send
/// a JSON object, the local backend is instructed to send a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Tool call requested by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    #[serde(default = "synthesize_call_id")]
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: LlmFunctionCall,
}

pub(crate) fn synthesize_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn function_type() -> String {
    "function".to_string()
}

impl LlmToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            r#type: function_type(),
            function: LlmFunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// Resolve the arguments into a JSON object.
    ///
    /// Accepts an already structured object or a string holding one.
    pub fn parsed_arguments(&self) -> Result<Map<String, Value>> {
        let value = match &self.function.arguments {
            Value::String(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
                AssistantError::ToolArgumentError(format!("arguments are not valid JSON: {}", e))
            })?,
            other => other.clone(),
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(AssistantError::ToolArgumentError(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}

/// Message in LLM conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<LlmToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl LlmMessage {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Create an assistant message that asks for tool execution
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<LlmToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::assistant(content)
        }
    }

    /// Create a tool result answering the given call
    pub fn tool_result(call: &LlmToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.function.name.clone()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }

    /// Tool calls carried by this message, if there is at least one.
    pub fn requested_tool_calls(&self) -> Option<&[LlmToolCall]> {
        self.tool_calls.as_deref().filter(|calls| !calls.is_empty())
    }
}
