pub mod local;
pub mod ollama;

pub use local::{
    shared_generator, ChatTemplate, LocalInferenceGateway, OllamaGeneratorConfig,
    OllamaTextGenerator, TextGenerator,
};
pub use ollama::{OllamaConfig, OllamaGateway};
