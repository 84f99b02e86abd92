/*!
 * Progress events and their newline-delimited JSON transport.
 *
 * The coordinator is the only writer of a `ProgressStream`. The stream
 * keeps the ordering guarantees consumers rely on: the top-level `current`
 * counter never goes backwards, and nothing is sent after a `complete` or
 * `error` event.
 */

use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::translation::models::{RunStatistics, TranslationOutcome};

/// Characters of the current sentence shown in a progress event
pub const PREVIEW_CHARS: usize = 50;

/// Default capacity of the event channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Metadata attached to progress events emitted during a retry wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryWaveProgress {
    /// Attempt tier being run (2 or 3)
    pub attempt: u8,
    /// Sentences finished in this wave so far
    pub current: usize,
    /// Sentences in this wave
    pub total: usize,
    /// 1-based batch within the wave
    pub batch: usize,
    pub batches: usize,
}

/// Incremental progress of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub current: usize,
    pub total: usize,
    pub sentence_id: String,
    pub current_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryWaveProgress>,
}

impl ProgressUpdate {
    pub fn new(current: usize, total: usize, sentence_id: &str, text: &str) -> Self {
        Self {
            current,
            total,
            sentence_id: sentence_id.to_string(),
            current_text: preview(text),
            retry: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryWaveProgress) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Terminal payload of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub results: Vec<TranslationOutcome>,
    pub statistics: RunStatistics,
    /// Id under which the run was stored, when persistence is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_batch_id: Option<String>,
}

/// One line of the progress stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress(ProgressUpdate),
    Complete(CompletionPayload),
    Error { error: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// First `PREVIEW_CHARS` characters of a sentence
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Serialize an event as one NDJSON line
pub fn encode_line(event: &ProgressEvent) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Single-writer sending half of a progress stream
#[derive(Debug)]
pub struct ProgressStream {
    sender: mpsc::Sender<ProgressEvent>,
    last_current: usize,
    finished: bool,
    disconnected: bool,
}

impl ProgressStream {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            sender,
            last_current: 0,
            finished: false,
            disconnected: false,
        }
    }

    /// Create a stream and the receiver its events arrive on
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }

    /// The consumer went away or a terminal event was already sent
    pub fn is_closed(&self) -> bool {
        self.finished || self.disconnected || self.sender.is_closed()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected || self.sender.is_closed()
    }

    /// Emit a progress event; `current` is clamped so it never decreases.
    /// Returns whether the event was delivered.
    pub async fn progress(&mut self, mut update: ProgressUpdate) -> bool {
        if update.current < self.last_current {
            debug!(
                "Clamping progress counter {} to {}",
                update.current, self.last_current
            );
            update.current = self.last_current;
        }
        let current = update.current;
        let delivered = self.send(ProgressEvent::Progress(update)).await;
        if delivered {
            self.last_current = current;
        }
        delivered
    }

    /// Emit the terminal `complete` event
    pub async fn complete(&mut self, payload: CompletionPayload) -> bool {
        let delivered = self.send(ProgressEvent::Complete(payload)).await;
        self.finished = true;
        delivered
    }

    /// Emit the terminal `error` event
    pub async fn error(&mut self, message: impl Into<String>) -> bool {
        let delivered = self.send(ProgressEvent::Error { error: message.into() }).await;
        self.finished = true;
        delivered
    }

    async fn send(&mut self, event: ProgressEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.sender.send(event).await.is_err() {
            warn!("Progress consumer disconnected; further events are dropped");
            self.disconnected = true;
            return false;
        }
        true
    }
}

/// Incremental NDJSON decoder tolerant of lines split across chunks
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and decode every complete line it finishes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<ProgressEvent, serde_json::Error>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = Self::decode(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the stream ended without a final newline
    pub fn finish(mut self) -> Option<Result<ProgressEvent, serde_json::Error>> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode(&rest)
    }

    /// Bytes of an incomplete trailing line still waiting for more input
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode(line: &[u8]) -> Option<Result<ProgressEvent, serde_json::Error>> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(trimmed))
        }
    }
}
