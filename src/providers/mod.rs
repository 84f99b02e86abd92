/*!
 * Provider implementations for the text-translation service.
 *
 * This module contains client implementations for the supported LLM APIs:
 * - OpenAI: chat completions, used for the fine-tuned model and for
 *   OpenAI-compatible local servers such as LM Studio
 * - Anthropic: messages API
 * - Mock: scripted provider for tests
 */

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// Sampling parameters for a single completion call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
}

impl GenerationParams {
    pub const fn new(temperature: f32, top_p: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            top_p,
            max_tokens,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    /// Same penalty for repeated tokens and for already-present tokens
    pub const fn with_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = penalty;
        self.presence_penalty = penalty;
        self
    }
}

/// Common trait for all LLM providers
///
/// A provider turns one prompt into one completion. It reports every failure
/// as a `ProviderError`; retrying and quality checks happen above it.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Short provider identifier, e.g. "openai"
    fn name(&self) -> &str;

    /// Model the provider sends requests to
    fn model(&self) -> &str;

    /// Complete a single prompt with the given sampling parameters
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Build the provider selected in the configuration
pub fn build_provider(config: &TranslationConfig) -> Result<Arc<dyn Provider>> {
    let timeout = Duration::from_secs(config.get_timeout_secs());
    let system_prompt = Some(config.system_prompt.clone()).filter(|p| !p.trim().is_empty());

    let provider: Arc<dyn Provider> = match config.provider {
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => Arc::new(
            openai::OpenAI::new(
                config.get_api_key(),
                config.get_endpoint(),
                config.get_model(),
                timeout,
            )?
            .with_name(config.provider.to_lowercase_string())
            .with_system_prompt(system_prompt),
        ),
        TranslationProvider::Anthropic => Arc::new(
            anthropic::Anthropic::new(
                config.get_api_key(),
                config.get_endpoint(),
                config.get_model(),
                timeout,
            )?
            .with_system_prompt(system_prompt),
        ),
    };

    Ok(provider)
}

pub mod anthropic;
pub mod mock;
pub mod openai;
