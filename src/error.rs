//! Error types and result aliases for the weather assistant.
//!
//! Most of these never reach the user as faults: the chat session folds them
//! into assistant or tool messages so the history stays a complete log.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Model communication error: {0}")]
    ModelCommunicationError(String),

    #[error("Weather API error: {0}")]
    UpstreamWeatherError(String),

    #[error("Tool argument error: {0}")]
    ToolArgumentError(String),

    #[error("Chat template error: {0}")]
    TemplateError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;
