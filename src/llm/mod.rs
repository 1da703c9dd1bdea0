pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum GenerationError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::ConnectionError(msg) => {
                write!(f, "generation connection error: {}", msg)
            }
            GenerationError::ResponseError(msg) => write!(f, "generation response error: {}", msg),
            GenerationError::ConfigError(msg) => write!(f, "generation config error: {}", msg),
        }
    }
}

impl Error for GenerationError {}

/// Boundary to the external free-form query-generation service. Output is
/// untrusted and must pass the synthesizer's validation before execution.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        schema_summary: &str,
    ) -> Result<String, GenerationError>;
}

pub struct LlmManager {
    generator: Box<dyn QueryGenerator + Send + Sync>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let generator: Box<dyn QueryGenerator + Send + Sync> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(GenerationError::ConfigError(format!(
                    "Unsupported generation backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self { generator })
    }
}

#[async_trait]
impl QueryGenerator for LlmManager {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
        schema_summary: &str,
    ) -> Result<String, GenerationError> {
        self.generator.generate(question, context, schema_summary).await
    }
}
