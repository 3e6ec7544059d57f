//! Tool calling emulated over a plain text-generation model.
//!
//! The model never sees structured tools: they are described in the system
//! instruction, and the answer is searched for the mandated JSON afterwards.

mod generator;
mod prompt;

pub use generator::{shared_generator, OllamaGeneratorConfig, OllamaTextGenerator, TextGenerator};
pub use prompt::{render_prompt, render_role_tagged, strip_prompt_echo, ChatTemplate};

use crate::error::{AssistantError, Result};
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::LlmMessage;
use crate::llm::tool_calls::extract_tool_calls;
use crate::llm::tools::ToolDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Gateway for models reachable only through [`TextGenerator`]
///
/// Generation failures are returned as `Err`; the caller decides how to
/// present them.
pub struct LocalInferenceGateway {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl LocalInferenceGateway {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }

    /// Bound a single generation call (default: 120 seconds)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render the exact prompt sent to the generator
    pub fn build_prompt(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<String> {
        let instruction = tools.map(prompt::tool_instruction).transpose()?;
        let prompt_messages = prompt::with_instruction(messages, instruction.as_deref());
        render_prompt(self.generator.chat_template(), &prompt_messages)
    }
}

#[async_trait]
impl LlmGateway for LocalInferenceGateway {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
        config: &CompletionConfig,
    ) -> Result<LlmMessage> {
        info!("Delegating to local inference for completion");

        let prompt = self.build_prompt(messages, tools)?;
        debug!("Prompt length: {}, tools enabled: {}", prompt.len(), tools.is_some());

        let generated = tokio::time::timeout(self.timeout, self.generator.generate(&prompt, config))
            .await
            .map_err(|_| {
                AssistantError::TimeoutError(format!(
                    "generation did not finish within {} seconds",
                    self.timeout.as_secs()
                ))
            })??;

        let continuation = strip_prompt_echo(&prompt, &generated).trim();

        if tools.is_some() {
            if let Some(calls) = extract_tool_calls(continuation).filter(|c| !c.is_empty()) {
                info!("Model requested {} tool call(s)", calls.len());
                return Ok(LlmMessage::assistant_with_tool_calls("", calls));
            }
        }

        Ok(LlmMessage::assistant(continuation))
    }
}
