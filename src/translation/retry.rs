/*!
 * Escalating retry schedule and the per-sentence attempt state machine.
 *
 * A sentence moves `Pending -> Attempting(1) -> Succeeded | NeedsRetry(1)
 * -> Attempting(2) -> … -> Succeeded | FailedAll`. It only advances when the
 * previous attempt failed in transport or was rejected by the quality gate;
 * a passing attempt is terminal.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::client::ClientResponse;
use super::models::{AttemptNumber, AttemptResult, FinalStatus, SentenceRecord, TranslationOutcome};
use super::quality::QualityValidator;
use crate::errors::{PipelineError, TransportErrorKind};
use crate::providers::GenerationParams;

/// Parameters for one attempt tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptTier {
    pub attempt: AttemptNumber,
    pub params: GenerationParams,
    /// Strip a trailing period before sending
    pub mutate_input: bool,
}

/// The three tiers, from fast to most conservative
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySchedule {
    tiers: [AttemptTier; 3],
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetrySchedule {
    /// Temperature and top-p narrow on each tier; the last tier also
    /// perturbs the input and raises the repetition penalties.
    pub const fn standard() -> Self {
        Self {
            tiers: [
                AttemptTier {
                    attempt: AttemptNumber::First,
                    params: GenerationParams::new(0.05, 0.8, 150),
                    mutate_input: false,
                },
                AttemptTier {
                    attempt: AttemptNumber::Second,
                    params: GenerationParams::new(0.10, 0.80, 200).with_penalty(0.1),
                    mutate_input: false,
                },
                AttemptTier {
                    attempt: AttemptNumber::Third,
                    params: GenerationParams::new(0.005, 0.60, 250).with_penalty(0.2),
                    mutate_input: true,
                },
            ],
        }
    }

    /// Build a schedule from explicit tiers; attempt numbers are reassigned
    /// by position
    pub fn new(mut tiers: [AttemptTier; 3]) -> Self {
        for (tier, number) in tiers.iter_mut().zip(AttemptNumber::ALL) {
            tier.attempt = number;
        }
        Self { tiers }
    }

    pub fn tier(&self, attempt: AttemptNumber) -> &AttemptTier {
        &self.tiers[attempt.index()]
    }

    pub fn tiers(&self) -> &[AttemptTier; 3] {
        &self.tiers
    }
}

/// Where a sentence is in its retry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceState {
    Pending,
    Attempting(AttemptNumber),
    NeedsRetry(AttemptNumber),
    Succeeded(AttemptNumber),
    FailedAll,
}

impl SentenceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::FailedAll)
    }

    /// The attempt this sentence should run next, if any
    pub fn next_attempt(self) -> Option<AttemptNumber> {
        match self {
            Self::Pending => Some(AttemptNumber::First),
            Self::NeedsRetry(previous) => previous.next(),
            Self::Attempting(_) | Self::Succeeded(_) | Self::FailedAll => None,
        }
    }
}

/// Turn a client response into an attempt record, applying the quality gate
/// against the unmodified source text
pub fn evaluate_attempt(
    attempt: AttemptNumber,
    original: &str,
    response: ClientResponse,
    validator: &QualityValidator,
) -> AttemptResult {
    if !response.success {
        let message = response.error.unwrap_or_else(|| "unknown error".to_string());
        let kind = response.error_kind.unwrap_or(TransportErrorKind::Api);
        return AttemptResult::transport_failure(attempt, message, kind);
    }

    let output = response.raw_output.unwrap_or_default();
    let report = validator.check(original, &output);
    if report.passed() {
        AttemptResult::success(attempt, output)
    } else {
        warn!(
            "Attempt {} rejected by quality gate ({}): '{}'",
            attempt,
            report.summary(),
            output
        );
        AttemptResult::quality_failure(attempt, output)
    }
}

/// Attempt history and state of one sentence
#[derive(Debug, Clone)]
pub struct RetryTracker {
    sentence_id: String,
    state: SentenceState,
    attempts: Vec<AttemptResult>,
}

impl RetryTracker {
    pub fn new(sentence_id: impl Into<String>) -> Self {
        Self {
            sentence_id: sentence_id.into(),
            state: SentenceState::Pending,
            attempts: Vec::with_capacity(3),
        }
    }

    pub fn state(&self) -> SentenceState {
        self.state
    }

    pub fn attempts(&self) -> &[AttemptResult] {
        &self.attempts
    }

    /// Whether this sentence belongs in the wave for `attempt`
    pub fn awaits(&self, attempt: AttemptNumber) -> bool {
        self.state.next_attempt() == Some(attempt)
    }

    /// Mark the next attempt as dispatched
    pub fn begin(&mut self, attempt: AttemptNumber) -> Result<(), PipelineError> {
        if !self.awaits(attempt) {
            return Err(self.invalid(format!("cannot start attempt {} from {:?}", attempt, self.state)));
        }
        self.state = SentenceState::Attempting(attempt);
        Ok(())
    }

    /// Record the result of the dispatched attempt and advance the state
    pub fn record(&mut self, result: AttemptResult) -> Result<SentenceState, PipelineError> {
        match self.state {
            SentenceState::Attempting(expected) if expected == result.attempt_number => {}
            state => {
                return Err(self.invalid(format!(
                    "attempt {} result recorded while {:?}",
                    result.attempt_number, state
                )));
            }
        }

        let attempt = result.attempt_number;
        let succeeded = result.succeeded;
        self.attempts.push(result);

        self.state = if succeeded {
            SentenceState::Succeeded(attempt)
        } else if attempt.next().is_some() {
            SentenceState::NeedsRetry(attempt)
        } else {
            SentenceState::FailedAll
        };

        debug!("Sentence {} -> {:?}", self.sentence_id, self.state);
        Ok(self.state)
    }

    /// Freeze the history into the final outcome
    pub fn finish(self, record: &SentenceRecord) -> Result<TranslationOutcome, PipelineError> {
        let (final_status, final_text) = match self.state {
            SentenceState::Succeeded(attempt) => {
                let text = self
                    .attempts
                    .last()
                    .map(|a| a.effective_text().to_string())
                    .unwrap_or_default();
                (FinalStatus::succeeded_on(attempt), text)
            }
            SentenceState::FailedAll => (FinalStatus::FailedAll, String::new()),
            state => {
                return Err(self.invalid(format!("finished while still {:?}", state)));
            }
        };

        Ok(TranslationOutcome {
            sentence_id: record.sentence_id.clone(),
            source_text: record.source_text.clone(),
            human_reference: record.human_reference.clone(),
            final_text,
            final_status,
            attempts: self.attempts,
        })
    }

    fn invalid(&self, detail: String) -> PipelineError {
        PipelineError::InvalidTransition {
            sentence_id: self.sentence_id.clone(),
            detail,
        }
    }
}
