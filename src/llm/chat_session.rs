//! One conversational session with an optional weather tool.
//!
//! Each call to [`ChatSession::send`] runs a full turn:
//! `FirstGeneration -> (ToolDispatch -> SecondGeneration)? -> Delivered`.
//! The history is append-only and records failures as ordinary messages, so
//! it stays a complete, replayable log of the session.

use crate::error::AssistantError;
use crate::llm::gateway::{CompletionConfig, LlmGateway};
use crate::llm::models::{synthesize_call_id, LlmMessage, LlmToolCall, MessageRole};
use crate::llm::tools::LlmTool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты — умный ассистент. Ты можешь вызывать функции. \
     Если пользователь спрашивает о погоде, используй инструмент get_weather. \
     Отвечай на русском языке.";

/// Where a turn currently stands
#[derive(Debug)]
enum TurnState {
    FirstGeneration,
    ToolDispatch(Vec<LlmToolCall>),
    SecondGeneration,
    Delivered(String),
}

/// A chat session that owns the conversation history.
///
/// # Examples
///
/// ```ignore
/// use weather_assistant::llm::ChatSession;
/// use weather_assistant::llm::gateways::OllamaGateway;
/// use weather_assistant::llm::tools::WeatherTool;
/// use std::sync::Arc;
///
/// let gateway = Arc::new(OllamaGateway::new()?);
/// let mut session = ChatSession::builder(gateway)
///     .tool(Box::new(WeatherTool::new(api_key)?))
///     .build();
///
/// let answer = session.send("Какая погода в Париже?").await;
/// println!("{}", answer);
/// ```
pub struct ChatSession {
    gateway: Arc<dyn LlmGateway>,
    tool: Option<Box<dyn LlmTool>>,
    supports_tools: bool,
    config: CompletionConfig,
    messages: Vec<LlmMessage>,
}

impl ChatSession {
    /// Create a new chat session with the default persona and no tool
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self::builder(gateway).build()
    }

    /// Create a chat session builder for custom configuration
    pub fn builder(gateway: Arc<dyn LlmGateway>) -> ChatSessionBuilder {
        ChatSessionBuilder::new(gateway)
    }

    /// Run one turn for `query` and return the delivered answer.
    ///
    /// Never fails: model and tool faults are answered with an error message
    /// that is also kept in the history.
    pub async fn send(&mut self, query: &str) -> String {
        self.messages.push(LlmMessage::user(query));

        let mut state = TurnState::FirstGeneration;
        loop {
            debug!("Turn state: {:?}", state);
            state = match state {
                TurnState::FirstGeneration => self.first_generation().await,
                TurnState::ToolDispatch(calls) => self.dispatch_tools(calls).await,
                TurnState::SecondGeneration => self.second_generation().await,
                TurnState::Delivered(answer) => return answer,
            };
        }
    }

    /// Get the current conversation history
    pub fn messages(&self) -> &[LlmMessage] {
        &self.messages
    }

    /// Content of the most recent assistant message
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
    }

    fn tool_enabled(&self) -> Option<&dyn LlmTool> {
        if self.supports_tools {
            self.tool.as_deref()
        } else {
            None
        }
    }

    async fn first_generation(&mut self) -> TurnState {
        let descriptors = self.tool_enabled().map(|tool| vec![tool.descriptor()]);

        let result = self
            .gateway
            .complete(&self.messages, descriptors.as_deref(), &self.config)
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => return self.deliver_failure(e),
        };

        let requested = descriptors
            .as_ref()
            .and(response.requested_tool_calls())
            .map(<[_]>::to_vec);
        let Some(calls) = requested else {
            return self.deliver(LlmMessage {
                tool_calls: None,
                ..response
            });
        };

        let calls = self.with_unique_ids(calls);
        info!("Tool calls requested: {}", calls.len());
        self.messages.push(LlmMessage {
            tool_calls: Some(calls.clone()),
            ..response
        });
        TurnState::ToolDispatch(calls)
    }

    /// Replace any call id already used in this conversation or earlier in `calls`.
    fn with_unique_ids(&self, calls: Vec<LlmToolCall>) -> Vec<LlmToolCall> {
        let mut seen: HashSet<String> = self
            .messages
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .map(|call| call.id.clone())
            .chain(self.messages.iter().filter_map(|m| m.tool_call_id.clone()))
            .collect();

        calls
            .into_iter()
            .map(|mut call| {
                if seen.contains(&call.id) {
                    let fresh = synthesize_call_id();
                    debug!("Tool call id {} already used, renamed to {}", call.id, fresh);
                    call.id = fresh;
                }
                seen.insert(call.id.clone());
                call
            })
            .collect()
    }

    async fn dispatch_tools(&mut self, calls: Vec<LlmToolCall>) -> TurnState {
        for call in &calls {
            let content = self.run_tool_call(call).await;
            self.messages.push(LlmMessage::tool_result(call, content));
        }
        TurnState::SecondGeneration
    }

    async fn run_tool_call(&self, call: &LlmToolCall) -> String {
        let Some(tool) = self.tool.as_deref().filter(|tool| tool.matches(call.name())) else {
            warn!("Tool not found: {}", call.name());
            return format!("Неизвестная функция: {}", call.name());
        };

        info!("Executing tool: {} ({})", call.name(), call.id);
        let result = match call.parsed_arguments() {
            Ok(args) => tool.run(&args).await,
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            warn!("Tool call {} failed: {}", call.id, e);
            format!("Ошибка обработки аргументов: {}", e)
        })
    }

    // Tools are never offered here, so a tool-call reply cannot recurse.
    async fn second_generation(&mut self) -> TurnState {
        let result = self.gateway.complete(&self.messages, None, &self.config).await;
        match result {
            Ok(response) => {
                if response.requested_tool_calls().is_some() {
                    warn!("Ignoring tool calls requested after tool results");
                }
                self.deliver(LlmMessage::assistant(response.content))
            }
            Err(e) => self.deliver_failure(e),
        }
    }

    fn deliver(&mut self, message: LlmMessage) -> TurnState {
        let answer = message.content.clone();
        self.messages.push(message);
        TurnState::Delivered(answer)
    }

    fn deliver_failure(&mut self, error: AssistantError) -> TurnState {
        warn!("Model generation failed: {}", error);
        let message = LlmMessage::assistant(format!("Ошибка связи с моделью: {}", error));
        self.deliver(message)
    }
}

/// Builder for constructing a `ChatSession` with custom configuration.
pub struct ChatSessionBuilder {
    gateway: Arc<dyn LlmGateway>,
    system_prompt: String,
    tool: Option<Box<dyn LlmTool>>,
    supports_tools: bool,
    config: CompletionConfig,
}

impl ChatSessionBuilder {
    fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self {
            gateway,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tool: None,
            supports_tools: true,
            config: CompletionConfig::default(),
        }
    }

    /// Set the system prompt (default: the Russian weather assistant persona)
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Register the tool the model may call
    pub fn tool(mut self, tool: Box<dyn LlmTool>) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Whether the model backend can be trusted with tool calling (default: true)
    pub fn supports_tools(mut self, supports_tools: bool) -> Self {
        self.supports_tools = supports_tools;
        self
    }

    pub fn completion_config(mut self, config: CompletionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the chat session
    pub fn build(self) -> ChatSession {
        ChatSession {
            gateway: self.gateway,
            tool: self.tool,
            supports_tools: self.supports_tools,
            config: self.config,
            messages: vec![LlmMessage::system(self.system_prompt)],
        }
    }
}
