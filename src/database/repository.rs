/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for storing finished runs,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::Result;
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::collections::HashSet;

use super::connection::DatabaseConnection;
use super::models::{BatchStats, SaveSummary, TranslationTaskRecord, UploadBatchRecord};
use crate::translation::models::{RunStatistics, TranslationOutcome};

/// Ids checked per existence query
const ID_LOOKUP_CHUNK: usize = 100;

/// Repository for database operations
#[derive(Debug, Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Batch Operations
    // =========================================================================

    /// Store a finished run under a new batch id.
    ///
    /// Sentences whose id is already stored are skipped and reported.
    pub async fn save_run(&self, outcomes: &[TranslationOutcome], provider: &str, model: &str) -> Result<SaveSummary> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        let ids: Vec<String> = outcomes.iter().map(|o| o.sentence_id.clone()).collect();
        let existing: HashSet<String> = self.existing_sentence_ids(&ids).await?.into_iter().collect();

        let tasks = outcomes
            .iter()
            .filter(|o| !existing.contains(&o.sentence_id))
            .map(|o| TranslationTaskRecord::from_outcome(o, &batch_id, &created_at))
            .collect::<Result<Vec<_>>>()?;

        let batch = UploadBatchRecord {
            id: batch_id.clone(),
            provider: provider.to_string(),
            model: model.to_string(),
            total_records: outcomes.len() as i64,
            stored_records: tasks.len() as i64,
            skipped_existing: existing.len() as i64,
            success_rate: RunStatistics::from_outcomes(outcomes).success_rate,
            created_at,
        };

        let stored = tasks.len();
        self.db
            .transaction_async(move |tx| {
                tx.execute(
                    r#"
                    INSERT INTO upload_batches (
                        id, provider, model, total_records, stored_records,
                        skipped_existing, success_rate, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        batch.id,
                        batch.provider,
                        batch.model,
                        batch.total_records,
                        batch.stored_records,
                        batch.skipped_existing,
                        batch.success_rate,
                        batch.created_at,
                    ],
                )?;

                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO translation_tasks (
                        sentence_id, original_text, human_translated_text, ai_translation,
                        final_status, attempts, source_type, upload_batch_id, status, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )?;
                for task in &tasks {
                    stmt.execute(params![
                        task.sentence_id,
                        task.original_text,
                        task.human_translated_text,
                        task.ai_translation,
                        task.final_status.as_str(),
                        task.attempts_json,
                        task.source_type.to_string(),
                        task.upload_batch_id,
                        task.status.to_string(),
                        task.created_at,
                    ])?;
                }
                Ok(())
            })
            .await?;

        let mut skipped_existing: Vec<String> = existing.into_iter().collect();
        skipped_existing.sort();

        info!(
            "Stored batch {}: {} of {} sentences ({} already stored)",
            batch_id,
            stored,
            outcomes.len(),
            skipped_existing.len()
        );

        Ok(SaveSummary {
            upload_batch_id: batch_id,
            total_records: outcomes.len(),
            stored_records: stored,
            skipped_existing,
        })
    }

    /// Ids among `sentence_ids` that are already stored
    pub async fn existing_sentence_ids(&self, sentence_ids: &[String]) -> Result<Vec<String>> {
        let ids = sentence_ids.to_vec();

        self.db
            .execute_async(move |conn| {
                let mut existing = Vec::new();
                for chunk in ids.chunks(ID_LOOKUP_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!(
                        "SELECT sentence_id FROM translation_tasks WHERE sentence_id IN ({})",
                        placeholders
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let found = stmt
                        .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    existing.extend(found);
                }
                debug!("{} of {} sentence ids already stored", existing.len(), ids.len());
                Ok(existing)
            })
            .await
    }

    /// Get a stored batch by id
    pub async fn get_batch(&self, batch_id: &str) -> Result<Option<UploadBatchRecord>> {
        let batch_id = batch_id.to_string();

        self.db
            .execute_async(move |conn| {
                let batch = conn
                    .query_row(
                        r#"
                        SELECT id, provider, model, total_records, stored_records,
                               skipped_existing, success_rate, created_at
                        FROM upload_batches WHERE id = ?1
                        "#,
                        params![batch_id],
                        |row| {
                            Ok(UploadBatchRecord {
                                id: row.get(0)?,
                                provider: row.get(1)?,
                                model: row.get(2)?,
                                total_records: row.get(3)?,
                                stored_records: row.get(4)?,
                                skipped_existing: row.get(5)?,
                                success_rate: row.get(6)?,
                                created_at: row.get(7)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(batch)
            })
            .await
    }

    /// Load every task stored for a batch, oldest first
    pub async fn load_batch_tasks(&self, batch_id: &str) -> Result<Vec<TranslationTaskRecord>> {
        let batch_id = batch_id.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, sentence_id, original_text, human_translated_text, ai_translation,
                           final_status, attempts, source_type, upload_batch_id, status, created_at
                    FROM translation_tasks
                    WHERE upload_batch_id = ?1
                    ORDER BY id ASC
                    "#,
                )?;

                let tasks = stmt
                    .query_map(params![batch_id], read_task_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tasks)
            })
            .await
    }

    /// Status counts for a batch, `None` when the batch does not exist
    pub async fn batch_stats(&self, batch_id: &str) -> Result<Option<BatchStats>> {
        if self.get_batch(batch_id).await?.is_none() {
            return Ok(None);
        }

        let batch_id = batch_id.to_string();
        self.db
            .execute_async(move |conn| {
                let stats = conn.query_row(
                    r#"
                    SELECT COUNT(*),
                           COALESCE(SUM(human_translated_text IS NOT NULL AND human_translated_text != ''), 0),
                           COALESCE(SUM(final_status != 'failed_all'), 0),
                           COALESCE(SUM(final_status = 'failed_all'), 0),
                           COALESCE(SUM(status = 'pending'), 0),
                           COALESCE(SUM(status = 'reviewed'), 0),
                           COALESCE(SUM(status = 'accepted'), 0),
                           COALESCE(SUM(status = 'rejected'), 0)
                    FROM translation_tasks WHERE upload_batch_id = ?1
                    "#,
                    params![batch_id],
                    |row| {
                        Ok(BatchStats {
                            total: row.get(0)?,
                            with_human_translation: row.get(1)?,
                            successful: row.get(2)?,
                            failed: row.get(3)?,
                            pending: row.get(4)?,
                            reviewed: row.get(5)?,
                            accepted: row.get(6)?,
                            rejected: row.get(7)?,
                        })
                    },
                )?;
                Ok(Some(stats))
            })
            .await
    }

    /// Delete a batch and its tasks; returns the number of tasks removed
    pub async fn clear_batch(&self, batch_id: &str) -> Result<usize> {
        let batch_id = batch_id.to_string();

        self.db
            .transaction_async(move |tx| {
                let removed = tx.execute(
                    "DELETE FROM translation_tasks WHERE upload_batch_id = ?1",
                    params![batch_id],
                )?;
                tx.execute("DELETE FROM upload_batches WHERE id = ?1", params![batch_id])?;
                debug!("Cleared batch {} ({} tasks)", batch_id, removed);
                Ok(removed)
            })
            .await
    }

    /// Delete everything; returns the number of tasks removed
    pub async fn clear_all(&self) -> Result<usize> {
        self.db
            .transaction_async(|tx| {
                let removed = tx.execute("DELETE FROM translation_tasks", [])?;
                tx.execute("DELETE FROM upload_batches", [])?;
                info!("Cleared all stored runs ({} tasks)", removed);
                Ok(removed)
            })
            .await
    }
}

/// Parse a text column into an enum stored by its string form
fn parse_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let text: String = row.get(index)?;
    text.parse()
        .map_err(|e: T::Err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into()))
}

fn read_task_row(row: &Row<'_>) -> rusqlite::Result<TranslationTaskRecord> {
    Ok(TranslationTaskRecord {
        id: Some(row.get(0)?),
        sentence_id: row.get(1)?,
        original_text: row.get(2)?,
        human_translated_text: row.get(3)?,
        ai_translation: row.get(4)?,
        final_status: parse_column(row, 5)?,
        attempts_json: row.get(6)?,
        source_type: parse_column(row, 7)?,
        upload_batch_id: row.get(8)?,
        status: parse_column(row, 9)?,
        created_at: row.get(10)?,
    })
}
