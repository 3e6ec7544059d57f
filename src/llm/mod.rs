pub mod chat_session;
pub mod gateway;
pub mod gateways;
pub mod models;
pub mod tool_calls;
pub mod tools;

pub use chat_session::{ChatSession, ChatSessionBuilder};
pub use gateway::{CompletionConfig, LlmGateway};
pub use models::{LlmFunctionCall, LlmMessage, LlmToolCall, MessageRole};
pub use tool_calls::extract_tool_calls;
pub use tools::{FunctionDescriptor, LlmTool, ToolDescriptor};
