/*!
 * Batch coordination of the retry pipeline.
 *
 * Sentences are processed in waves, one per attempt tier. The first wave
 * covers every sentence in batches of `first_pass_batch_size`; each later
 * wave only carries the sentences still unresolved, in smaller batches with
 * a longer pause between them. Within a batch every call runs concurrently
 * and the batch always settles completely before the next one starts.
 */

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::client::TranslationClient;
use super::models::{AttemptNumber, RunStatistics, SentenceRecord, TranslationOutcome};
use super::quality::QualityValidator;
use super::retry::{RetrySchedule, RetryTracker, evaluate_attempt};
use crate::errors::PipelineError;
use crate::progress::{ProgressStream, ProgressUpdate, RetryWaveProgress};

fn default_first_pass_batch_size() -> usize {
    10
}

fn default_retry_batch_size() -> usize {
    3
}

fn default_first_pass_delay_ms() -> u64 {
    100
}

fn default_retry_delay_ms() -> u64 {
    200
}

/// Batch sizes and inter-batch throttling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_first_pass_batch_size")]
    pub first_pass_batch_size: usize,

    #[serde(default = "default_retry_batch_size")]
    pub retry_batch_size: usize,

    /// Pause between first-pass batches
    #[serde(default = "default_first_pass_delay_ms")]
    pub first_pass_delay_ms: u64,

    /// Pause between retry batches
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            first_pass_batch_size: default_first_pass_batch_size(),
            retry_batch_size: default_retry_batch_size(),
            first_pass_delay_ms: default_first_pass_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BatchConfig {
    /// Default sizes with no throttling
    pub fn without_delays() -> Self {
        Self {
            first_pass_delay_ms: 0,
            retry_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn batch_size(&self, attempt: AttemptNumber) -> usize {
        let size = match attempt {
            AttemptNumber::First => self.first_pass_batch_size,
            _ => self.retry_batch_size,
        };
        size.max(1)
    }

    pub fn delay(&self, attempt: AttemptNumber) -> Duration {
        match attempt {
            AttemptNumber::First => Duration::from_millis(self.first_pass_delay_ms),
            _ => Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Final result of a coordinator run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// One outcome per input sentence, in input order
    pub outcomes: Vec<TranslationOutcome>,
    pub statistics: RunStatistics,
    pub elapsed: Duration,
}

/// Drives sentences through the attempt tiers and reports progress
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    client: TranslationClient,
    validator: QualityValidator,
    schedule: RetrySchedule,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(client: TranslationClient, validator: QualityValidator) -> Self {
        Self {
            client,
            validator,
            schedule: RetrySchedule::standard(),
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn client(&self) -> &TranslationClient {
        &self.client
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process every sentence and return the ordered outcomes.
    ///
    /// Progress is written to `progress` as each result is recorded; the
    /// terminal event is left to the caller. A consumer disconnect stops the
    /// run at the next batch boundary with `PipelineError::Cancelled`.
    pub async fn run(
        &self,
        sentences: &[SentenceRecord],
        progress: &mut ProgressStream,
    ) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let total = sentences.len();
        let mut trackers: Vec<RetryTracker> = sentences
            .iter()
            .map(|s| RetryTracker::new(s.sentence_id.clone()))
            .collect();

        info!("Starting translation of {} sentences", total);

        let mut first_pass_done = 0;
        for attempt in AttemptNumber::ALL {
            let wave: Vec<usize> = trackers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.awaits(attempt))
                .map(|(i, _)| i)
                .collect();

            if wave.is_empty() {
                debug!("No sentences left for attempt {}", attempt);
                continue;
            }

            let batch_size = self.config.batch_size(attempt);
            let batches = wave.len().div_ceil(batch_size);
            if attempt != AttemptNumber::First {
                info!(
                    "Retry wave {}: {} sentences in {} batches",
                    attempt,
                    wave.len(),
                    batches
                );
            }

            let mut wave_done = 0;
            for (batch_index, chunk) in wave.chunks(batch_size).enumerate() {
                if progress.is_disconnected() {
                    warn!(
                        "Consumer disconnected; stopping before batch {}/{} of attempt {}",
                        batch_index + 1,
                        batches,
                        attempt
                    );
                    return Err(PipelineError::Cancelled);
                }

                debug!(
                    "Attempt {} batch {}/{} ({} sentences)",
                    attempt,
                    batch_index + 1,
                    batches,
                    chunk.len()
                );

                for &index in chunk {
                    trackers[index].begin(attempt)?;
                }

                let tier = self.schedule.tier(attempt);
                let mut pending: FuturesUnordered<_> = chunk
                    .iter()
                    .map(|&index| {
                        let text = sentences[index].source_text.as_str();
                        async move {
                            let response = self.client.translate(text, &tier.params, tier.mutate_input).await;
                            (index, response)
                        }
                    })
                    .collect();

                while let Some((index, response)) = pending.next().await {
                    let record = &sentences[index];
                    let result = evaluate_attempt(attempt, &record.source_text, response, &self.validator);
                    trackers[index].record(result)?;
                    wave_done += 1;

                    let update = if attempt == AttemptNumber::First {
                        first_pass_done += 1;
                        ProgressUpdate::new(first_pass_done, total, &record.sentence_id, &record.source_text)
                    } else {
                        ProgressUpdate::new(total, total, &record.sentence_id, &record.source_text).with_retry(
                            RetryWaveProgress {
                                attempt: attempt.as_u8(),
                                current: wave_done,
                                total: wave.len(),
                                batch: batch_index + 1,
                                batches,
                            },
                        )
                    };
                    progress.progress(update).await;
                }

                let delay = self.config.delay(attempt);
                if batch_index + 1 < batches && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let outcomes = trackers
            .into_iter()
            .zip(sentences)
            .map(|(tracker, record)| tracker.finish(record))
            .collect::<Result<Vec<_>, _>>()?;

        let statistics = RunStatistics::from_outcomes(&outcomes);
        let elapsed = started.elapsed();
        info!(
            "Translation finished in {:?}: {}/{} successful ({:.1}%), {} transport failures, {} quality failures",
            elapsed,
            statistics.successful,
            statistics.total,
            statistics.success_rate,
            statistics.transport_failed,
            statistics.quality_failed
        );

        Ok(RunReport {
            outcomes,
            statistics,
            elapsed,
        })
    }
}
