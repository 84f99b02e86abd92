/*!
 * SQLite connection handle shared by the repository.
 *
 * One connection sits behind a mutex; async callers reach it through
 * `spawn_blocking` so queries never run on the runtime's worker threads.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::schema;

const DB_FILENAME: &str = "ksl-review.db";

/// Directory under the user's data directory holding the store
const DB_DIRNAME: &str = "ksl-review";

const IN_MEMORY: &str = ":memory:";

/// How long a writer waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cloneable handle to the review store
#[derive(Clone)]
pub struct DatabaseConnection {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnection").field("path", &self.path).finish()
    }
}

impl DatabaseConnection {
    /// Open the store under the user data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (or create) the store at `path`, creating parent directories
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        info!("Opening review database at {:?}", path);
        let conn = Connection::open(&path).with_context(|| format!("Failed to open database: {:?}", path))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::prepare(conn, path)
    }

    /// Private in-memory store, used by tests
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory review database");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::prepare(conn, PathBuf::from(IN_MEMORY))
    }

    fn prepare(conn: Connection, path: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<data dir>/ksl-review/ksl-review.db`
    pub fn default_database_path() -> Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;
        Ok(base.join(DB_DIRNAME).join(DB_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }

    /// Run `f` with the connection on the current thread
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.conn.lock())
    }

    /// Run `f` with the connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| f(conn)).await
    }

    /// Run `f` inside a transaction on the blocking pool. The transaction
    /// commits when `f` succeeds and rolls back otherwise.
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut conn.lock()))
            .await
            .context("Database task panicked")?
    }

    /// Row counts and file size
    pub fn stats(&self) -> Result<DatabaseStats> {
        let file_size_bytes = if self.is_in_memory() {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        self.execute(|conn| {
            let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |row| row.get(0)) };
            Ok(DatabaseStats {
                batch_count: count("SELECT COUNT(*) FROM upload_batches")?,
                task_count: count("SELECT COUNT(*) FROM translation_tasks")?,
                pending_count: count("SELECT COUNT(*) FROM translation_tasks WHERE status = 'pending'")?,
                file_size_bytes,
            })
        })
    }
}

/// Size of the review store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Stored runs
    pub batch_count: i64,
    /// Stored sentence outcomes
    pub task_count: i64,
    /// Outcomes still awaiting review
    pub pending_count: i64,
    pub file_size_bytes: u64,
}

impl std::fmt::Display for DatabaseStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} runs, {} sentences ({} awaiting review), {} KB",
            self.batch_count,
            self.task_count,
            self.pending_count,
            self.file_size_bytes / 1024
        )
    }
}
