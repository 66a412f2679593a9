use super::traits::Provider;
use crate::error::GeneratorError;
use std::sync::Arc;

/// Opaque `generate(text) -> text` over a configured provider and model.
#[derive(Clone)]
pub struct PromptGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
}

impl PromptGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    pub async fn generate(&self, text: &str) -> Result<String, GeneratorError> {
        let reply = self
            .provider
            .chat(text, &self.model, self.temperature)
            .await
            .map_err(|error| {
                tracing::error!(provider = self.provider.name(), "generation failed: {error:#}");
                GeneratorError::Request {
                    provider: self.provider.name().to_string(),
                    message: format!("{error:#}"),
                }
            })?;

        if reply.trim().is_empty() {
            return Err(GeneratorError::EmptyResponse {
                provider: self.provider.name().to_string(),
            });
        }

        Ok(reply)
    }
}
