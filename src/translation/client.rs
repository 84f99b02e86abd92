/*!
 * Single-call translation client.
 *
 * Wraps a provider with the per-call response-time budget and the optional
 * input perturbation used on the last attempt. Failures come back inside
 * `ClientResponse`; nothing here returns an error to the caller.
 */

use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{ProviderError, TransportErrorKind};
use crate::providers::{GenerationParams, Provider};

/// Default response-time budget for one call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one call to the translation service
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub success: bool,
    pub raw_output: Option<String>,
    pub error: Option<String>,
    pub error_kind: Option<TransportErrorKind>,
    /// Text actually sent, after any mutation
    pub sent_text: String,
    pub elapsed: Duration,
}

impl ClientResponse {
    fn ok(sent_text: String, output: String, elapsed: Duration) -> Self {
        Self {
            success: true,
            raw_output: Some(output),
            error: None,
            error_kind: None,
            sent_text,
            elapsed,
        }
    }

    fn failed(sent_text: String, error: &ProviderError, elapsed: Duration) -> Self {
        Self {
            success: false,
            raw_output: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            sent_text,
            elapsed,
        }
    }
}

/// Drop exactly one trailing period, if present
pub fn strip_trailing_period(text: &str) -> &str {
    text.strip_suffix('.').unwrap_or(text)
}

/// Translation client bound to one provider
#[derive(Debug, Clone)]
pub struct TranslationClient {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl TranslationClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Translate `text` once with the given parameters
    pub async fn translate(&self, text: &str, params: &GenerationParams, mutate_input: bool) -> ClientResponse {
        let sent = if mutate_input {
            let mutated = strip_trailing_period(text);
            if mutated.len() != text.len() {
                debug!("Input perturbed for retry: '{}' -> '{}'", text, mutated);
            }
            mutated
        } else {
            text
        };

        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.provider.complete(sent, params)).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(Ok(output)) => {
                let output = output.trim().to_string();
                if output.is_empty() {
                    Err(ProviderError::EmptyResponse)
                } else {
                    Ok(output)
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(output) => ClientResponse::ok(sent.to_string(), output, elapsed),
            Err(e) => {
                warn!("Translation call failed after {:?}: {}", elapsed, e);
                ClientResponse::failed(sent.to_string(), &e, elapsed)
            }
        }
    }
}
