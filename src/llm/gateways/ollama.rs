use crate::error::{AssistantError, Result};
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::LlmMessage;
use crate::llm::tools::ToolDescriptor;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3:instruct";

/// Configuration for connecting to Ollama server
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: LlmMessage,
}

/// Gateway for an Ollama chat server with native tool calling
///
/// Communication faults never surface as `Err` from [`LlmGateway::complete`]:
/// they come back as an assistant message describing the failure.
pub struct OllamaGateway {
    client: Client,
    config: OllamaConfig,
}

impl OllamaGateway {
    /// Create a new Ollama gateway with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(OllamaConfig::default())
    }

    /// Create a new Ollama gateway with custom configuration
    pub fn with_config(config: OllamaConfig) -> Result<Self> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self { client, config })
    }

    /// Create gateway with custom host
    pub fn with_host(host: impl Into<String>) -> Result<Self> {
        Self::with_config(OllamaConfig {
            host: host.into(),
            ..Default::default()
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Check that the Ollama server answers at all
    pub async fn check_availability(&self) -> Result<()> {
        debug!("Checking Ollama availability at {}", self.config.host);

        let response = self.client.get(&self.config.host).send().await?;

        if !response.status().is_success() {
            return Err(AssistantError::ModelCommunicationError(format!(
                "Ollama responded with {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn build_chat_body(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
        config: &CompletionConfig,
    ) -> Result<Value> {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": adapt_messages_to_ollama(messages)?,
            "options": extract_ollama_options(config),
            "stream": false
        });

        if let Some(tools) = tools {
            body["tools"] = serde_json::to_value(tools)?;
        }

        Ok(body)
    }

    async fn chat(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
        config: &CompletionConfig,
    ) -> Result<LlmMessage> {
        let body = self.build_chat_body(messages, tools, config)?;

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.host))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistantError::ModelCommunicationError(format!(
                "Ollama API error: {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.message)
    }
}

#[async_trait]
impl LlmGateway for OllamaGateway {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        tools: Option<&[ToolDescriptor]>,
        config: &CompletionConfig,
    ) -> Result<LlmMessage> {
        info!("Delegating to Ollama for completion");
        debug!(
            "Model: {}, Message count: {}, tools enabled: {}",
            self.config.model,
            messages.len(),
            tools.is_some()
        );

        match self.chat(messages, tools, config).await {
            Ok(message) => Ok(message),
            Err(e) => {
                warn!("Ollama completion failed: {}", e);
                Ok(LlmMessage::assistant(format!("Ошибка связи с Ollama: {}", e)))
            }
        }
    }
}

// Message adapter for Ollama format
fn adapt_messages_to_ollama(messages: &[LlmMessage]) -> Result<Vec<Value>> {
    messages
        .iter()
        .map(|msg| {
            let mut ollama_msg = serde_json::json!({
                "role": msg.role.as_str(),
                "content": msg.content
            });

            // Ollama expects structured arguments on replayed tool calls
            if let Some(tool_calls) = &msg.tool_calls {
                let calls: Vec<_> = tool_calls
                    .iter()
                    .map(|tc| {
                        let arguments = tc
                            .parsed_arguments()
                            .map(Value::Object)
                            .unwrap_or_else(|_| tc.function.arguments.clone());
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.function.name,
                                "arguments": arguments
                            }
                        })
                    })
                    .collect();
                ollama_msg["tool_calls"] = serde_json::to_value(calls)?;
            }

            if let Some(id) = &msg.tool_call_id {
                ollama_msg["tool_call_id"] = Value::String(id.clone());
            }
            if let Some(name) = &msg.name {
                ollama_msg["name"] = Value::String(name.clone());
            }

            Ok(ollama_msg)
        })
        .collect()
}

// Extract Ollama-specific options from config
pub(crate) fn extract_ollama_options(config: &CompletionConfig) -> Value {
    let mut options = serde_json::json!({
        "temperature": config.temperature,
        "num_ctx": config.num_ctx,
    });

    if config.max_tokens > 0 {
        options["num_predict"] = serde_json::json!(config.max_tokens);
    }

    options
}
