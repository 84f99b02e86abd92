/*!
 * Data model for a translation run.
 *
 * Sentence records come in, attempt results accumulate per sentence, and a
 * single outcome per sentence comes out. Outcomes serialize to the flat
 * result schema (`attempt_1_result` .. `attempt_3_result`) while keeping the
 * attempt history as an ordered list in memory.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::TransportErrorKind;

/// Marker prefix written into the raw output of a transport failure
pub const TRANSPORT_FAILURE_MARKER: &str = "번역 실패";

/// One input sentence, immutable for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceRecord {
    pub sentence_id: String,
    pub source_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_reference: Option<String>,
}

impl SentenceRecord {
    pub fn new(sentence_id: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            sentence_id: sentence_id.into(),
            source_text: source_text.into(),
            human_reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.human_reference = Some(reference.into());
        self
    }
}

/// Attempt tier number, always 1, 2 or 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AttemptNumber {
    First,
    Second,
    Third,
}

impl AttemptNumber {
    pub const ALL: [AttemptNumber; 3] = [Self::First, Self::Second, Self::Third];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }

    /// The tier that follows this one, if any
    pub fn next(self) -> Option<Self> {
        match self {
            Self::First => Some(Self::Second),
            Self::Second => Some(Self::Third),
            Self::Third => None,
        }
    }

    /// Zero-based position in an attempt history
    pub fn index(self) -> usize {
        usize::from(self.as_u8()) - 1
    }
}

impl From<AttemptNumber> for u8 {
    fn from(value: AttemptNumber) -> Self {
        value.as_u8()
    }
}

impl TryFrom<u8> for AttemptNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            3 => Ok(Self::Third),
            other => Err(format!("attempt number must be 1, 2 or 3, got {}", other)),
        }
    }
}

impl fmt::Display for AttemptNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptKind {
    Success,
    QualityFailure,
    TransportFailure,
}

/// Outcome of one invocation of the translation client for one sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_number: AttemptNumber,
    pub raw_output: Option<String>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub kind: AttemptKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<TransportErrorKind>,
}

impl AttemptResult {
    /// A call that returned output which passed the quality gate
    pub fn success(attempt_number: AttemptNumber, output: impl Into<String>) -> Self {
        Self {
            attempt_number,
            raw_output: Some(output.into()),
            succeeded: true,
            error_message: None,
            kind: AttemptKind::Success,
            error_kind: None,
        }
    }

    /// A call that returned output the quality gate rejected
    pub fn quality_failure(attempt_number: AttemptNumber, raw_output: impl Into<String>) -> Self {
        Self {
            attempt_number,
            raw_output: Some(raw_output.into()),
            succeeded: false,
            error_message: Some("translation rejected by quality validation".to_string()),
            kind: AttemptKind::QualityFailure,
            error_kind: None,
        }
    }

    /// A call that failed before producing usable output
    pub fn transport_failure(
        attempt_number: AttemptNumber,
        message: impl Into<String>,
        error_kind: TransportErrorKind,
    ) -> Self {
        let message = message.into();
        Self {
            attempt_number,
            raw_output: Some(format!("[{}: {}]", TRANSPORT_FAILURE_MARKER, message)),
            succeeded: false,
            error_message: Some(message),
            kind: AttemptKind::TransportFailure,
            error_kind: Some(error_kind),
        }
    }

    /// The text this attempt contributes as a visible result
    pub fn effective_text(&self) -> &str {
        match self.kind {
            AttemptKind::Success => self.raw_output.as_deref().unwrap_or_default(),
            AttemptKind::QualityFailure | AttemptKind::TransportFailure => "",
        }
    }
}

/// Terminal status of a sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    #[serde(rename = "success_1st")]
    Success1st,
    #[serde(rename = "success_2nd")]
    Success2nd,
    #[serde(rename = "success_3rd")]
    Success3rd,
    #[serde(rename = "failed_all")]
    FailedAll,
}

impl FinalStatus {
    /// Status for a sentence that passed on the given attempt
    pub fn succeeded_on(attempt: AttemptNumber) -> Self {
        match attempt {
            AttemptNumber::First => Self::Success1st,
            AttemptNumber::Second => Self::Success2nd,
            AttemptNumber::Third => Self::Success3rd,
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, Self::FailedAll)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success1st => "success_1st",
            Self::Success2nd => "success_2nd",
            Self::Success3rd => "success_3rd",
            Self::FailedAll => "failed_all",
        }
    }
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FinalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success_1st" => Ok(Self::Success1st),
            "success_2nd" => Ok(Self::Success2nd),
            "success_3rd" => Ok(Self::Success3rd),
            "failed_all" => Ok(Self::FailedAll),
            other => Err(format!("unknown final status: {}", other)),
        }
    }
}

/// Final record of how one sentence was resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "OutcomeWire", try_from = "OutcomeWire")]
pub struct TranslationOutcome {
    pub sentence_id: String,
    pub source_text: String,
    pub human_reference: Option<String>,
    pub final_text: String,
    pub final_status: FinalStatus,
    pub attempts: Vec<AttemptResult>,
}

impl TranslationOutcome {
    pub fn attempt(&self, number: AttemptNumber) -> Option<&AttemptResult> {
        self.attempts.get(number.index())
    }

    /// The last attempt made for this sentence
    pub fn last_attempt(&self) -> Option<&AttemptResult> {
        self.attempts.last()
    }

    /// Whether a failed sentence ran out of attempts on a transport failure
    pub fn ended_in_transport_failure(&self) -> bool {
        self.final_status == FinalStatus::FailedAll
            && self
                .last_attempt()
                .is_some_and(|a| a.kind == AttemptKind::TransportFailure)
    }
}

/// Flat wire shape of an outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeWire {
    sentence_id: String,
    source_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    human_reference: Option<String>,
    final_text: String,
    final_status: FinalStatus,
    #[serde(rename = "attempt_1_result", default, skip_serializing_if = "Option::is_none")]
    attempt_1_result: Option<AttemptResult>,
    #[serde(rename = "attempt_2_result", default, skip_serializing_if = "Option::is_none")]
    attempt_2_result: Option<AttemptResult>,
    #[serde(rename = "attempt_3_result", default, skip_serializing_if = "Option::is_none")]
    attempt_3_result: Option<AttemptResult>,
}

impl From<TranslationOutcome> for OutcomeWire {
    fn from(outcome: TranslationOutcome) -> Self {
        let mut attempts = outcome.attempts.into_iter();
        Self {
            sentence_id: outcome.sentence_id,
            source_text: outcome.source_text,
            human_reference: outcome.human_reference,
            final_text: outcome.final_text,
            final_status: outcome.final_status,
            attempt_1_result: attempts.next(),
            attempt_2_result: attempts.next(),
            attempt_3_result: attempts.next(),
        }
    }
}

impl TryFrom<OutcomeWire> for TranslationOutcome {
    type Error = String;

    fn try_from(wire: OutcomeWire) -> Result<Self, Self::Error> {
        let slots = [wire.attempt_1_result, wire.attempt_2_result, wire.attempt_3_result];
        let mut attempts = Vec::with_capacity(3);
        let mut gap = false;
        for (slot, expected) in slots.into_iter().zip(AttemptNumber::ALL) {
            match slot {
                Some(_) if gap => {
                    return Err(format!("attempt {} recorded after a missing attempt", expected));
                }
                Some(attempt) if attempt.attempt_number != expected => {
                    return Err(format!(
                        "attempt_{}_result carries attempt number {}",
                        expected, attempt.attempt_number
                    ));
                }
                Some(attempt) => attempts.push(attempt),
                None => gap = true,
            }
        }

        Ok(Self {
            sentence_id: wire.sentence_id,
            source_text: wire.source_text,
            human_reference: wire.human_reference,
            final_text: wire.final_text,
            final_status: wire.final_status,
            attempts,
        })
    }
}

/// Aggregate counts over a finished run
///
/// Only quality-passing output counts as successful; a call that returned
/// text the validator rejected is a failure regardless of the transport
/// outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub transport_failed: usize,
    pub quality_failed: usize,
    pub success_1st: usize,
    pub success_2nd: usize,
    pub success_3rd: usize,
    pub success_rate: f64,
}

impl RunStatistics {
    pub fn from_outcomes(outcomes: &[TranslationOutcome]) -> Self {
        let mut stats = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome.final_status {
                FinalStatus::Success1st => stats.success_1st += 1,
                FinalStatus::Success2nd => stats.success_2nd += 1,
                FinalStatus::Success3rd => stats.success_3rd += 1,
                FinalStatus::FailedAll if outcome.ended_in_transport_failure() => {
                    stats.transport_failed += 1
                }
                FinalStatus::FailedAll => stats.quality_failed += 1,
            }
        }

        stats.successful = stats.success_1st + stats.success_2nd + stats.success_3rd;
        stats.failed = stats.transport_failed + stats.quality_failed;
        stats.success_rate = if stats.total > 0 {
            stats.successful as f64 / stats.total as f64 * 100.0
        } else {
            0.0
        };
        stats
    }
}
