//! Google Gemini provider.
//!
//! Authentication priority:
//! 1. Explicit API key (config `api_key`)
//! 2. `GEMINI_API_KEY` environment variable
//! 3. `GOOGLE_API_KEY` environment variable

use crate::llm::{
    scrub::sanitize_api_error,
    traits::{Provider, ProviderFuture},
};
use reqwest::Client;
use std::time::Duration;

mod types;
use types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Build the shared HTTP client used for model calls.
pub fn build_provider_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Self {
        let resolved_key = api_key
            .map(String::from)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok());

        if resolved_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; Gemini calls will fail");
        }

        Self {
            api_key: resolved_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: build_provider_client(timeout_secs),
        }
    }

    /// Point the provider at a different API root (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request(
        system_prompt: Option<&str>,
        message: &str,
        temperature: f64,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(message)],
            }],
            system_instruction: system_prompt.map(|sys| Content {
                role: None,
                parts: vec![Part::text(sys)],
            }),
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }

    fn model_name(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    fn api_key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "Gemini API key not found. Set GEMINI_API_KEY or `api_key` in config.toml \
                 (get a key from https://aistudio.google.com/app/apikey)"
            )
        })
    }

    async fn call_api(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/v1beta/{}:generateContent",
            self.base_url,
            Self::model_name(model)
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Gemini API error ({status}): {}",
                sanitize_api_error(&error_text)
            );
        }

        let result: GenerateContentResponse = response.json().await?;
        if let Some(err) = result.error.as_ref() {
            anyhow::bail!("Gemini API error: {}", sanitize_api_error(&err.message));
        }

        Ok(result)
    }

    fn extract_text(result: &GenerateContentResponse) -> anyhow::Result<String> {
        if let Some(reason) = result
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            anyhow::bail!("Gemini blocked the prompt: {reason}");
        }

        let text = result
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            let finish_reason = result
                .candidates
                .as_ref()
                .and_then(|c| c.first())
                .and_then(|candidate| candidate.finish_reason.as_deref())
                .unwrap_or("none");
            anyhow::bail!("No response from Gemini (finish reason: {finish_reason})");
        }

        Ok(text)
    }
}

impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn chat_with_system<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let request = Self::build_request(system_prompt, message, temperature);
            let result = self.call_api(model, &request).await?;
            if let Some(usage) = result.usage_metadata.as_ref() {
                tracing::debug!(
                    model = result.model_version.as_deref().unwrap_or(model),
                    input_tokens = usage.prompt_token_count,
                    output_tokens = usage.candidates_token_count,
                    "gemini call completed"
                );
            }
            Self::extract_text(&result)
        })
    }
}
