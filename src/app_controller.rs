use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::database::{DatabaseConnection, Repository};
use crate::export;
use crate::progress::{CompletionPayload, DEFAULT_CHANNEL_CAPACITY, NdjsonDecoder, ProgressEvent, ProgressStream};
use crate::providers::{self, Provider};
use crate::server::{self, AppState};
use crate::translation::batch::BatchCoordinator;
use crate::translation::client::TranslationClient;
use crate::translation::models::RunStatistics;
use crate::translation::quality::QualityValidator;
use crate::upload::parse_upload;

// @module: Application controller for CSV translation runs

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Shared runtime used by both the CLI and the server
    state: AppState,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let provider = providers::build_provider(&config.translation)?;
        Self::with_provider(config, provider)
    }

    /// Create a controller around an already built provider
    pub fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Result<Self> {
        let client = TranslationClient::new(provider)
            .with_timeout(Duration::from_secs(config.pipeline.request_timeout_secs));
        let coordinator = BatchCoordinator::new(client, QualityValidator::new(config.quality.clone()))
            .with_config(config.pipeline.batching.clone());

        let repository = if config.database.enabled {
            let db = match &config.database.path {
                Some(path) => DatabaseConnection::new(path)?,
                None => DatabaseConnection::new_default()?,
            };
            Some(Repository::new(db))
        } else {
            None
        };

        let state = AppState::new(coordinator, repository, config.server.max_upload_bytes);
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Translate a CSV file in-process and write the result CSV.
    /// Returns the path written.
    pub async fn translate_file(&self, input: &Path, output: Option<PathBuf>) -> Result<PathBuf> {
        let bytes = tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read input file: {:?}", input))?;
        let parsed = parse_upload(&bytes, self.config.server.max_upload_bytes)?;

        info!(
            "KSL review: {} - {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );

        let (mut progress, mut receiver) = ProgressStream::channel(DEFAULT_CHANNEL_CAPACITY);
        let mut renderer = ProgressRenderer::new(parsed.records.len() as u64);
        let render = async move {
            let mut terminal = None;
            while let Some(event) = receiver.recv().await {
                if let Some(result) = renderer.handle(event) {
                    terminal = Some(result);
                }
            }
            terminal
        };

        // The stream is moved into the run so the renderer sees the channel close
        let records = parsed.records;
        let run = async move { self.state.execute(&records, &mut progress).await };

        let (report, terminal) = tokio::join!(run, render);
        let report = report?;
        if let Some(Err(e)) = terminal {
            return Err(e);
        }

        let output = output.unwrap_or_else(|| export::default_output_path(input));
        export::write_results_file(&output, &report.outcomes)?;
        log_statistics(&report.statistics, report.elapsed);
        info!("Results written to {:?}", output);
        Ok(output)
    }

    /// Run the HTTP server
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.server.socket_addr()?;
        server::serve(self.state.clone(), addr).await
    }
}

/// Post a CSV file to a running server, render its progress stream and
/// write the result CSV. Returns the path written.
pub async fn submit(input: &Path, url: &str, output: Option<PathBuf>) -> Result<PathBuf> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read input file: {:?}", input))?;

    let endpoint = url::Url::parse(url)
        .and_then(|base| base.join("/api/translate-csv"))
        .with_context(|| format!("Invalid server URL: {}", url))?;

    info!("Submitting {:?} to {}", input, endpoint);
    let response = reqwest::Client::new()
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "text/csv")
        .body(bytes)
        .send()
        .await
        .context("Failed to reach the translation server")?;

    let status = response.status();
    let mut decoder = NdjsonDecoder::new();
    let mut renderer = ProgressRenderer::new(0);
    let mut terminal = None;

    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("Progress stream interrupted")?;
        for event in decoder.feed(&chunk) {
            let event = event.context("Malformed progress event")?;
            if let Some(result) = renderer.handle(event) {
                terminal = Some(result);
            }
        }
    }
    if let Some(event) = decoder.finish() {
        let event = event.context("Malformed progress event")?;
        if let Some(result) = renderer.handle(event) {
            terminal = Some(result);
        }
    }

    let payload = match terminal {
        Some(result) => result?,
        None => return Err(anyhow!("Server closed the stream without a result (HTTP {})", status)),
    };

    let output = output.unwrap_or_else(|| export::default_output_path(input));
    export::write_results_file(&output, &payload.results)?;
    if let Some(batch_id) = &payload.upload_batch_id {
        info!("Stored by the server as batch {}", batch_id);
    }
    info!("Results written to {:?}", output);
    Ok(output)
}

/// Renders progress events on a terminal progress bar
struct ProgressRenderer {
    bar: ProgressBar,
}

impl ProgressRenderer {
    fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sentences ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=>-"));
        Self { bar }
    }

    /// Apply one event; terminal events yield the run result
    fn handle(&mut self, event: ProgressEvent) -> Option<Result<CompletionPayload>> {
        match event {
            ProgressEvent::Progress(update) => {
                self.bar.set_length(update.total as u64);
                self.bar.set_position(update.current as u64);
                match update.retry {
                    Some(retry) => self.bar.set_message(format!(
                        "retry {} ({}/{}): {}",
                        retry.attempt, retry.current, retry.total, update.current_text
                    )),
                    None => self.bar.set_message(update.current_text),
                }
                None
            }
            ProgressEvent::Complete(payload) => {
                self.bar.finish_and_clear();
                Some(Ok(payload))
            }
            ProgressEvent::Error { error } => {
                self.bar.abandon_with_message("failed");
                Some(Err(anyhow!("Translation failed: {}", error)))
            }
        }
    }
}

fn log_statistics(stats: &RunStatistics, elapsed: Duration) {
    info!(
        "Translated {} sentences in {}: {} successful ({:.1}%), 1st/2nd/3rd attempt {}/{}/{}",
        stats.total,
        format_duration(elapsed),
        stats.successful,
        stats.success_rate,
        stats.success_1st,
        stats.success_2nd,
        stats.success_3rd
    );
    if stats.failed > 0 {
        warn!(
            "{} sentences failed all attempts ({} transport, {} quality)",
            stats.failed, stats.transport_failed, stats.quality_failed
        );
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, duration.subsec_millis())
    }
}
