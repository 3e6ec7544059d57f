pub mod config;
pub mod error;
pub mod llm;

pub use error::{AssistantError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{AssistantConfig, Backend};
    pub use crate::error::{AssistantError, Result};
    pub use crate::llm::gateways::{LocalInferenceGateway, OllamaGateway};
    pub use crate::llm::tools::{LlmTool, ToolDescriptor, WeatherTool};
    pub use crate::llm::{ChatSession, CompletionConfig, LlmGateway, LlmMessage, MessageRole};
}
