use crate::error::Result;
use crate::llm::models::LlmMessage;
use crate::llm::tools::ToolDescriptor;
use async_trait::async_trait;

/// Configuration for LLM completion
///
/// Defaults favour determinism: picking a tool is an instruction-following
/// task, not open-ended writing.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub temperature: f32,
    pub num_ctx: usize,
    pub max_tokens: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            num_ctx: 8192,
            max_tokens: 512,
        }
    }
}

/// A model backend that turns a conversation into one new assistant message.
///
/// Passing `tools` enables tool calling for this call only; the returned
/// message carries `tool_calls` when the model asked for one.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
        config: &CompletionConfig,
    ) -> Result<LlmMessage>;
}
