/*!
 * Database entity models and DTOs.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::translation::models::{AttemptResult, FinalStatus, TranslationOutcome};

/// Review status of a stored task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Awaiting human review
    Pending,
    Reviewed,
    Accepted,
    Rejected,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Reviewed => write!(f, "reviewed"),
            TaskStatus::Accepted => write!(f, "accepted"),
            TaskStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "reviewed" => Ok(TaskStatus::Reviewed),
            "accepted" => Ok(TaskStatus::Accepted),
            "rejected" => Ok(TaskStatus::Rejected),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Where a task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    CsvUpload,
    Manual,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::CsvUpload => write!(f, "csv_upload"),
            SourceType::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv_upload" => Ok(SourceType::CsvUpload),
            "manual" => Ok(SourceType::Manual),
            _ => Err(anyhow::anyhow!("Invalid source type: {}", s)),
        }
    }
}

/// One stored translation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadBatchRecord {
    /// Batch id (uuid v4)
    pub id: String,
    pub provider: String,
    pub model: String,
    /// Sentences in the run
    pub total_records: i64,
    /// Sentences newly stored
    pub stored_records: i64,
    /// Sentences skipped because their id was already stored
    pub skipped_existing: i64,
    pub success_rate: f64,
    pub created_at: String,
}

/// One stored sentence outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationTaskRecord {
    /// Row id, `None` before insertion
    pub id: Option<i64>,
    pub sentence_id: String,
    pub original_text: String,
    pub human_translated_text: Option<String>,
    pub ai_translation: Option<String>,
    pub final_status: FinalStatus,
    /// Attempt history as JSON
    pub attempts_json: String,
    pub source_type: SourceType,
    pub upload_batch_id: String,
    pub status: TaskStatus,
    pub created_at: String,
}

impl TranslationTaskRecord {
    /// Build a pending task from a finished outcome
    pub fn from_outcome(outcome: &TranslationOutcome, upload_batch_id: &str, created_at: &str) -> Result<Self> {
        let attempts_json =
            serde_json::to_string(&outcome.attempts).context("Failed to serialize attempt history")?;

        Ok(Self {
            id: None,
            sentence_id: outcome.sentence_id.clone(),
            original_text: outcome.source_text.clone(),
            human_translated_text: outcome.human_reference.clone(),
            ai_translation: Some(outcome.final_text.clone()).filter(|t| !t.is_empty()),
            final_status: outcome.final_status,
            attempts_json,
            source_type: SourceType::CsvUpload,
            upload_batch_id: upload_batch_id.to_string(),
            status: TaskStatus::Pending,
            created_at: created_at.to_string(),
        })
    }

    /// Decode the stored attempt history
    pub fn attempts(&self) -> Result<Vec<AttemptResult>> {
        serde_json::from_str(&self.attempts_json).context("Failed to parse stored attempt history")
    }
}

/// Status counts for one stored batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: i64,
    pub with_human_translation: i64,
    pub successful: i64,
    pub failed: i64,
    pub pending: i64,
    pub reviewed: i64,
    pub accepted: i64,
    pub rejected: i64,
}

/// Outcome of saving a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub upload_batch_id: String,
    pub total_records: usize,
    pub stored_records: usize,
    /// Ids that were already stored and left untouched
    pub skipped_existing: Vec<String>,
}
