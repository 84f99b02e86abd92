/*!
 * Quality-gated retry translation pipeline.
 *
 * The pipeline is split into several submodules:
 *
 * - `models`: sentence records, attempt results, outcomes and statistics
 * - `quality`: heuristic rejection of unusable gloss output
 * - `client`: a single timed call to the translation provider
 * - `retry`: the attempt schedule and per-sentence state machine
 * - `batch`: wave and batch coordination with progress reporting
 */

// Re-export main types for easier usage
pub use self::batch::{BatchConfig, BatchCoordinator, RunReport};
pub use self::client::{ClientResponse, TranslationClient};
pub use self::models::{
    AttemptKind, AttemptNumber, AttemptResult, FinalStatus, RunStatistics, SentenceRecord, TranslationOutcome,
};
pub use self::quality::{QualityReport, QualityThresholds, QualityValidator};
pub use self::retry::{AttemptTier, RetrySchedule, RetryTracker, SentenceState};

// Submodules
pub mod batch;
pub mod client;
pub mod models;
pub mod quality;
pub mod retry;
