/*!
 * Database module for persistent storage of finished runs.
 *
 * This module provides SQLite-based persistence for:
 * - Upload batches, one per stored run
 * - Translation tasks, one per sentence outcome, awaiting review
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

// Re-export main types
pub use connection::DatabaseConnection;
pub use repository::Repository;
