/*!
 * Mock provider implementations for testing.
 *
 * This module provides a mock provider that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with a gloss of the input
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::slow(ms)` - Succeeds after a delay (for timeout testing)
 * - `MockProvider::scripted(f)` - Delegates to a closure per call
 *
 * Every call is recorded so tests can assert on what was sent.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{GenerationParams, Provider};
use crate::errors::ProviderError;

/// Closure deciding the response to one call
pub type ScriptFn = Arc<dyn Fn(&str, &GenerationParams) -> Result<String, ProviderError> + Send + Sync>;

/// A call the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub prompt: String,
    pub params: GenerationParams,
}

/// Behavior mode for the mock provider
#[derive(Clone)]
pub enum MockBehavior {
    /// Always succeeds with `{prompt}`
    Working,
    /// Always fails with an API error
    Failing,
    /// Succeeds after a delay
    Slow { delay_ms: u64 },
    /// Scripted per call
    Scripted(ScriptFn),
}

impl std::fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "Working"),
            Self::Failing => write!(f, "Failing"),
            Self::Slow { delay_ms } => write!(f, "Slow({}ms)", delay_ms),
            Self::Scripted(_) => write!(f, "Scripted"),
        }
    }
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn scripted<F>(script: F) -> Self
    where
        F: Fn(&str, &GenerationParams) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self::new(MockBehavior::Scripted(Arc::new(script)))
    }

    /// Snapshot of every call made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls whose prompt matches exactly
    pub fn calls_for(&self, prompt: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.prompt == prompt)
            .cloned()
            .collect()
    }

    fn gloss(prompt: &str) -> String {
        format!("{{{}}}", prompt.trim_end_matches('.'))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, ProviderError> {
        self.calls.lock().push(MockCall {
            prompt: prompt.to_string(),
            params: *params,
        });

        match &self.behavior {
            MockBehavior::Working => Ok(Self::gloss(prompt)),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Mock provider failure".to_string(),
            }),
            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(Self::gloss(prompt))
            }
            MockBehavior::Scripted(script) => script(prompt, params),
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Mock connection refused".to_string())),
            _ => Ok(()),
        }
    }
}
