//! Runtime configuration read from the environment (and `.env`, if present).

use crate::error::{AssistantError, Result};
use crate::llm::chat_session::ChatSession;
use crate::llm::gateway::LlmGateway;
use crate::llm::gateways::ollama::{DEFAULT_OLLAMA_HOST, DEFAULT_OLLAMA_MODEL};
use crate::llm::gateways::{
    shared_generator, ChatTemplate, LocalInferenceGateway, OllamaConfig, OllamaGateway,
    OllamaGeneratorConfig, OllamaTextGenerator, TextGenerator,
};
use crate::llm::tools::{WeatherConfig, WeatherTool};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Which gateway answers the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Ollama chat API with structured tool calling
    Remote,
    /// Plain text generation with emulated tool calling
    Local,
}

impl std::str::FromStr for Backend {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(AssistantError::ConfigError(format!(
                "MODEL_BACKEND must be 'remote' or 'local', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub openweather_api_key: String,
    pub model: String,
    pub backend: Backend,
    pub supports_tools: bool,
    pub ollama_host: String,
    pub chat_template: Option<ChatTemplate>,
    pub request_timeout: Duration,
    pub generation_timeout: Duration,
}

impl AssistantConfig {
    /// Load `.env` into the process environment, then read the settings.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the settings through `lookup`; unset and blank values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let openweather_api_key = get("OPENWEATHER_API_KEY").ok_or_else(|| {
            AssistantError::ConfigError("OPENWEATHER_API_KEY is not set".to_string())
        })?;

        let backend = match get("MODEL_BACKEND") {
            Some(value) => value.parse()?,
            None => Backend::Remote,
        };

        let supports_tools = match get("MODEL_SUPPORTS_TOOLS") {
            Some(value) => parse_bool("MODEL_SUPPORTS_TOOLS", &value)?,
            None => true,
        };

        let chat_template = get("LOCAL_CHAT_TEMPLATE")
            .map(|name| {
                ChatTemplate::from_name(&name).ok_or_else(|| {
                    AssistantError::ConfigError(format!(
                        "LOCAL_CHAT_TEMPLATE must be 'chatml' or 'llama3', got '{}'",
                        name
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            openweather_api_key,
            model: get("WEATHER_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            backend,
            supports_tools,
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            chat_template,
            request_timeout: parse_secs(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            generation_timeout: parse_secs(
                "GENERATION_TIMEOUT_SECS",
                get("GENERATION_TIMEOUT_SECS"),
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?,
        })
    }

    pub fn weather_tool(&self) -> Result<WeatherTool> {
        WeatherTool::with_config(WeatherConfig {
            timeout: self.request_timeout,
            ..WeatherConfig::new(self.openweather_api_key.clone())
        })
    }

    /// Gateway for the remote chat API, also used for availability checks
    pub fn ollama_gateway(&self) -> Result<OllamaGateway> {
        OllamaGateway::with_config(OllamaConfig {
            host: self.ollama_host.clone(),
            model: self.model.clone(),
            timeout: Some(self.generation_timeout),
        })
    }

    /// Fail unless the Ollama host answers; both backends generate through it.
    pub async fn ensure_ollama_available(&self) -> Result<()> {
        self.ollama_gateway()?.check_availability().await
    }

    /// Text generator for the local backend, shared across the process by
    /// model, host and chat template.
    pub fn local_generator(&self) -> Result<Arc<dyn TextGenerator>> {
        let generator_config = OllamaGeneratorConfig {
            host: self.ollama_host.clone(),
            chat_template: self.chat_template,
            ..OllamaGeneratorConfig::new(self.model.clone())
        };

        shared_generator(&generator_config.cache_key(), || {
            let generator = OllamaTextGenerator::with_config(generator_config.clone())?;
            Ok(Arc::new(generator) as Arc<dyn TextGenerator>)
        })
    }

    /// Gateway for the configured backend
    pub fn gateway(&self) -> Result<Arc<dyn LlmGateway>> {
        match self.backend {
            Backend::Remote => Ok(Arc::new(self.ollama_gateway()?)),
            Backend::Local => Ok(Arc::new(
                LocalInferenceGateway::new(self.local_generator()?)
                    .with_timeout(self.generation_timeout),
            )),
        }
    }

    /// A fresh session wired with the weather tool
    pub fn session(&self) -> Result<ChatSession> {
        info!(
            "Starting session: model={}, backend={:?}, tools={}",
            self.model, self.backend, self.supports_tools
        );
        Ok(ChatSession::builder(self.gateway()?)
            .tool(Box::new(self.weather_tool()?))
            .supports_tools(self.supports_tools)
            .build())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AssistantError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}

fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<Duration> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };

    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(AssistantError::ConfigError(format!(
            "{} must be a positive number of seconds, got '{}'",
            key, value
        ))),
    }
}
