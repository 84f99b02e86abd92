/*!
 * Scripted mock providers for pipeline tests
 *
 * Each helper wraps `MockProvider::scripted` so that responses can be planned
 * per sentence and per attempt. `GaugedProvider` answers slowly and records
 * how many calls overlap. Prompts are matched with any trailing period
 * removed, since the last attempt sends the sentence without it.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ksl_review::errors::ProviderError;
use ksl_review::providers::mock::MockProvider;
use ksl_review::providers::{GenerationParams, Provider};

/// One planned reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return this text
    Text(String),
    /// Fail with an API error
    ApiError,
    /// Fail with a connection error
    ConnectionError,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Output the quality gate rejects for any sentence without dates
    pub fn hallucinated_dates() -> Self {
        Self::text("{2019}+년+{3}+월+{27}+일")
    }

    fn into_result(self) -> Result<String, ProviderError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::ApiError => Err(ProviderError::ApiError {
                status_code: 500,
                message: "scripted failure".to_string(),
            }),
            Self::ConnectionError => Err(ProviderError::ConnectionError("scripted reset".to_string())),
        }
    }
}

fn key(prompt: &str) -> String {
    prompt.trim_end_matches('.').to_string()
}

/// A clean gloss for any prompt
pub fn gloss(prompt: &str) -> String {
    format!("{{{}}}", key(prompt))
}

/// Provider answering from per-sentence reply queues. Sentences without a
/// plan, or whose plan is used up, get a clean gloss.
pub fn planned_provider(plan: Vec<(&str, Vec<Reply>)>) -> MockProvider {
    let queues: HashMap<String, VecDeque<Reply>> = plan
        .into_iter()
        .map(|(text, replies)| (key(text), replies.into_iter().collect()))
        .collect();
    let queues = Arc::new(Mutex::new(queues));

    MockProvider::scripted(move |prompt, _params| {
        let reply = queues.lock().get_mut(&key(prompt)).and_then(|q| q.pop_front());
        match reply {
            Some(reply) => reply.into_result(),
            None => Ok(gloss(prompt)),
        }
    })
}

/// Provider that fails every call for the listed sentences
pub fn always_failing_for(texts: &[&str]) -> MockProvider {
    let failing: Vec<String> = texts.iter().map(|t| key(t)).collect();
    MockProvider::scripted(move |prompt, _params| {
        if failing.contains(&key(prompt)) {
            Reply::ApiError.into_result()
        } else {
            Ok(gloss(prompt))
        }
    })
}

/// Start or end of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Started(String),
    Finished(String),
}

/// Slow provider that measures how many calls are in flight.
///
/// Every call sleeps before answering; prompts listed as `slow` sleep longer.
/// Prompts listed as `rejected` get output the quality gate refuses on their
/// first attempt. The peak number of concurrent calls is kept per attempt.
#[derive(Debug, Clone, Default)]
pub struct GaugedProvider {
    delay: Duration,
    slow_delay: Duration,
    slow: Vec<String>,
    rejected: Vec<String>,
    state: Arc<Mutex<GaugeState>>,
}

#[derive(Debug, Default)]
struct GaugeState {
    active: usize,
    peak_by_attempt: [usize; 3],
    attempts_seen: HashMap<String, usize>,
    events: Vec<CallEvent>,
}

impl GaugedProvider {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            slow_delay: Duration::from_millis(delay_ms),
            ..Self::default()
        }
    }

    /// Make the listed prompts take `delay_ms` instead
    pub fn with_slow(mut self, prompts: &[&str], delay_ms: u64) -> Self {
        self.slow = prompts.iter().map(|p| key(p)).collect();
        self.slow_delay = Duration::from_millis(delay_ms);
        self
    }

    /// Fail the quality gate on the first attempt of the listed prompts
    pub fn with_rejected_first_attempt(mut self, prompts: &[&str]) -> Self {
        self.rejected = prompts.iter().map(|p| key(p)).collect();
        self
    }

    /// Highest number of concurrent calls seen during attempt `n` (1-based)
    pub fn peak(&self, attempt: usize) -> usize {
        self.state.lock().peak_by_attempt[attempt - 1]
    }

    /// Start and finish of every call, in the order they happened
    pub fn events(&self) -> Vec<CallEvent> {
        self.state.lock().events.clone()
    }
}

#[async_trait]
impl Provider for GaugedProvider {
    fn name(&self) -> &str {
        "gauged"
    }

    fn model(&self) -> &str {
        "gauged-model"
    }

    async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String, ProviderError> {
        let prompt = key(prompt);
        let attempt = {
            let mut state = self.state.lock();
            let seen = state.attempts_seen.entry(prompt.clone()).or_insert(0);
            *seen += 1;
            let attempt = (*seen).min(3);
            state.active += 1;
            let active = state.active;
            let peak = &mut state.peak_by_attempt[attempt - 1];
            *peak = (*peak).max(active);
            state.events.push(CallEvent::Started(prompt.clone()));
            attempt
        };

        let delay = if self.slow.contains(&prompt) { self.slow_delay } else { self.delay };
        tokio::time::sleep(delay).await;

        {
            let mut state = self.state.lock();
            state.active -= 1;
            state.events.push(CallEvent::Finished(prompt.clone()));
        }

        if attempt == 1 && self.rejected.contains(&prompt) {
            Ok("{2019}+년+{3}+월+{27}+일".to_string())
        } else {
            Ok(format!("{{{}}}", prompt))
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
