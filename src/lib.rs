/*!
 * # KSL review - Korean to sign-language gloss translation
 *
 * A Rust library that translates Korean sentences into Korean Sign Language
 * gloss with a fine-tuned model and prepares the output for human review.
 *
 * ## Features
 *
 * - CSV upload parsing with per-row skip reporting
 * - Up to three attempts per sentence, each with more conservative sampling
 * - Rule-based quality gate on every model output
 * - Batched, paced execution with a streamed NDJSON progress feed
 * - Optional SQLite persistence of finished runs for review
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `upload`: CSV upload parsing
 * - `translation`: The retry pipeline:
 *   - `translation::quality`: Output quality validation
 *   - `translation::client`: Single model calls with timeout and cleanup
 *   - `translation::retry`: Attempt tiers and per-sentence state
 *   - `translation::batch`: Wave and batch scheduling over a whole upload
 * - `progress`: Progress events and their NDJSON encoding
 * - `export`: Result CSV writing
 * - `server`: HTTP endpoints
 * - `database`: Storage of finished runs
 * - `app_controller`: Main application controller
 * - `providers`: Client implementations for the supported LLM APIs
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod errors;
pub mod export;
pub mod progress;
pub mod providers;
pub mod server;
pub mod translation;
pub mod upload;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, PipelineError, ProviderError, UploadError};
pub use progress::{ProgressEvent, ProgressStream};
pub use translation::{BatchCoordinator, QualityValidator, TranslationClient, TranslationOutcome};
