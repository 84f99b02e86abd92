use anyhow::{Context, Result};
use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{GenerationParams, Provider};
use crate::errors::ProviderError;

/// OpenAI chat-completions client
///
/// Also serves OpenAI-compatible servers (LM Studio) through a custom endpoint.
#[derive(Debug)]
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication (may be empty for local servers)
    api_key: String,
    /// Base URL, e.g. https://api.openai.com/v1
    endpoint: String,
    /// Model identifier, typically a fine-tuned `ft:` model
    model: String,
    /// Optional system message sent before the sentence
    system_prompt: Option<String>,
    /// Name reported through the Provider trait
    name: String,
    /// Per-request budget, also used to label timeouts
    timeout: Duration,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

/// One chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// One completion choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl OpenAIRequest {
    /// Build a request carrying the sentence as the single user message
    pub fn new(model: &str, system_prompt: Option<&str>, prompt: &str, params: &GenerationParams) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system.to_string()),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: Some(prompt.to_string()),
        });

        Self {
            model: model.to_string(),
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stream: false,
        }
    }
}

impl OpenAI {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for OpenAI")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            system_prompt: None,
            name: "openai".to_string(),
            timeout,
        })
    }

    /// Override the name reported by the provider
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    fn api_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.openai.com/v1/chat/completions".to_string()
        } else {
            format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
        }
    }

    /// Send a chat completion request
    pub async fn send(&self, request: &OpenAIRequest) -> Result<OpenAIResponse, ProviderError> {
        let mut builder = self.client.post(self.api_url()).json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI API error ({}): {}", status, error_text);
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        response
            .json::<OpenAIResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    /// Extract the first choice's text
    pub fn extract_text(response: &OpenAIResponse) -> Option<String> {
        response
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl Provider for OpenAI {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError> {
        let request = OpenAIRequest::new(&self.model, self.system_prompt.as_deref(), prompt, params);
        let response = self.send(&request).await?;
        Self::extract_text(&response).ok_or(ProviderError::EmptyResponse)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let params = GenerationParams::new(0.0, 1.0, 5);
        self.complete("안녕하세요", &params).await.map(|_| ())
    }
}
