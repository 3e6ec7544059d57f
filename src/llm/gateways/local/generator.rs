use super::prompt::ChatTemplate;
use crate::error::{AssistantError, Result};
use crate::llm::gateway::CompletionConfig;
use crate::llm::gateways::ollama::{extract_ollama_options, DEFAULT_OLLAMA_HOST};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Raw text generation: one prompt in, generated text out.
///
/// Implementations may return the continuation alone or the prompt followed
/// by the continuation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, config: &CompletionConfig) -> Result<String>;

    /// Native turn formatting of the underlying model, when known
    fn chat_template(&self) -> Option<ChatTemplate> {
        None
    }
}

type GeneratorCache = Mutex<HashMap<String, Arc<dyn TextGenerator>>>;

static GENERATORS: LazyLock<GeneratorCache> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Process-wide generator for `key`, built by `init` on first use only.
///
/// `key` must identify everything `init` captures (see
/// [`OllamaGeneratorConfig::cache_key`]). The lock is held while `init` runs,
/// so concurrent callers never load the same model twice.
pub fn shared_generator<F>(key: &str, init: F) -> Result<Arc<dyn TextGenerator>>
where
    F: FnOnce() -> Result<Arc<dyn TextGenerator>>,
{
    let mut cache = GENERATORS.lock().map_err(|_| {
        AssistantError::ModelCommunicationError("generator cache lock poisoned".to_string())
    })?;

    if let Some(generator) = cache.get(key) {
        debug!("Reusing text generator for {}", key);
        return Ok(Arc::clone(generator));
    }

    info!("Initializing text generator for {}", key);
    let generator = init()?;
    cache.insert(key.to_string(), Arc::clone(&generator));
    Ok(generator)
}

/// Configuration for raw prompt generation on an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaGeneratorConfig {
    pub host: String,
    pub model: String,
    pub chat_template: Option<ChatTemplate>,
    pub timeout: Option<Duration>,
}

impl OllamaGeneratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            host: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
            model: model.into(),
            chat_template: None,
            timeout: None,
        }
    }

    /// Identity of the generator this config builds, for [`shared_generator`]
    pub fn cache_key(&self) -> String {
        let template = match self.chat_template {
            Some(ChatTemplate::ChatMl) => "chatml",
            Some(ChatTemplate::Llama3) => "llama3",
            None => "role-tagged",
        };
        format!("{}@{}/{}", self.model, self.host, template)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`TextGenerator`] backed by Ollama's `/api/generate` in raw mode
///
/// Raw mode skips Ollama's own templating, so the prompt reaches the model
/// exactly as rendered.
pub struct OllamaTextGenerator {
    client: Client,
    config: OllamaGeneratorConfig,
}

impl OllamaTextGenerator {
    pub fn with_config(config: OllamaGeneratorConfig) -> Result<Self> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = config.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            client: client_builder.build()?,
            config,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaTextGenerator {
    async fn generate(&self, prompt: &str, config: &CompletionConfig) -> Result<String> {
        debug!("Raw generation with {} ({} prompt bytes)", self.config.model, prompt.len());

        let body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "raw": true,
            "stream": false,
            "options": extract_ollama_options(config)
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.host))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistantError::ModelCommunicationError(format!(
                "Ollama generate error: {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }

    fn chat_template(&self) -> Option<ChatTemplate> {
        self.config.chat_template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGenerator;

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str, _config: &CompletionConfig) -> Result<String> {
            Ok("fixed".to_string())
        }
    }

    fn generator_for(server: &mockito::Server) -> OllamaTextGenerator {
        OllamaTextGenerator::with_config(OllamaGeneratorConfig {
            host: server.url(),
            chat_template: Some(ChatTemplate::ChatMl),
            ..OllamaGeneratorConfig::new("qwen3:4b")
        })
        .unwrap()
    }

    #[test]
    fn test_shared_generator_initializes_once() {
        let inits = AtomicUsize::new(0);
        let init = || {
            inits.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedGenerator) as Arc<dyn TextGenerator>)
        };

        let first = shared_generator("test-model-initializes-once", init).unwrap();
        let second = shared_generator("test-model-initializes-once", || {
            inits.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedGenerator) as Arc<dyn TextGenerator>)
        })
        .unwrap();

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_shared_generator_keyed_by_model() {
        let fixed = || Ok(Arc::new(FixedGenerator) as Arc<dyn TextGenerator>);
        let a = shared_generator("test-model-key-a", fixed).unwrap();
        let b = shared_generator("test-model-key-b", fixed).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_shared_generator_failed_init_is_not_cached() {
        let failed = shared_generator("test-model-failing", || {
            Err(AssistantError::ModelCommunicationError("weights missing".to_string()))
        });
        assert!(failed.is_err());

        let retried = shared_generator("test-model-failing", || {
            Ok(Arc::new(FixedGenerator) as Arc<dyn TextGenerator>)
        });
        assert!(retried.is_ok());
    }

    #[test]
    fn test_cache_key_covers_host_and_template() {
        let base = OllamaGeneratorConfig {
            host: "http://a:11434".to_string(),
            ..OllamaGeneratorConfig::new("qwen3:4b")
        };
        let other_host = OllamaGeneratorConfig {
            host: "http://b:11434".to_string(),
            ..base.clone()
        };
        let other_template = OllamaGeneratorConfig {
            chat_template: Some(ChatTemplate::ChatMl),
            ..base.clone()
        };

        assert_eq!(base.cache_key(), base.clone().cache_key());
        assert_ne!(base.cache_key(), other_host.cache_key());
        assert_ne!(base.cache_key(), other_template.cache_key());
    }

    #[test]
    fn test_generator_exposes_configured_template() {
        let generator = OllamaTextGenerator::with_config(OllamaGeneratorConfig {
            chat_template: Some(ChatTemplate::Llama3),
            ..OllamaGeneratorConfig::new("llama3")
        })
        .unwrap();

        assert_eq!(generator.chat_template(), Some(ChatTemplate::Llama3));
    }

    #[tokio::test]
    async fn test_generate_raw_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "qwen3:4b",
                "prompt": "<|im_start|>user\nHi<|im_end|>\n<|im_start|>assistant\n",
                "raw": true,
                "stream": false
            })))
            .with_status(200)
            .with_body(r#"{"model":"qwen3:4b","response":"Hello!","done":true}"#)
            .create_async()
            .await;

        let result = generator_for(&server)
            .generate(
                "<|im_start|>user\nHi<|im_end|>\n<|im_start|>assistant\n",
                &CompletionConfig::default(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, "Hello!");
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/api/generate").with_status(404).create_async().await;

        let result = generator_for(&server).generate("Hi", &CompletionConfig::default()).await;

        match result {
            Err(AssistantError::ModelCommunicationError(_)) => {}
            other => panic!("Expected ModelCommunicationError, got {:?}", other),
        }
    }
}
