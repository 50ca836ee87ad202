pub mod course;
pub mod lecture;
pub mod module;
pub mod progress;

use std::{str::FromStr, sync::Arc, time::Duration};

use moka::future::Cache;
use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};

type StudentLectureId = (i64, i64);

/// Owns modules, lectures, courses and student progress.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub database: SqlitePool,
    progress_locks: Cache<StudentLectureId, Arc<Mutex<()>>>,
}

impl Catalog {
    pub fn new(database: SqlitePool, lock_capacity: u64) -> Self {
        Self {
            database,
            progress_locks: Cache::new(lock_capacity),
        }
    }

    /// connect to the database, create it if missing and bring the schema up to date
    pub async fn connect(database_url: &str, lock_capacity: u64) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        if let Some(dir) = options.get_filename().parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| Error::Fatal(e.into()))?;
            }
        }
        let database = SqlitePoolOptions::new().connect_with(options).await?;
        let catalog = Self::new(database, lock_capacity);
        catalog.migrate().await?;
        info!("catalog database ready at {}", database_url);
        Ok(catalog)
    }

    /// A private in-memory database, every call gets a fresh one.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // a second connection would see a different empty database
        let database = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let catalog = Self::new(database, 1000);
        catalog.migrate().await?;
        Ok(catalog)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.database).await?;
        Ok(())
    }

    /// Write transaction holding the database write lock from the start.
    /// A deferred `BEGIN` that reads first gets SQLITE_BUSY on upgrade
    /// instead of waiting out the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.database.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Lock serializing progress writes of one student in one lecture.
    async fn progress_lock(&self, student_id: i64, lecture_id: i64) -> Arc<Mutex<()>> {
        self.progress_locks
            .get_with((student_id, lecture_id), async { Arc::new(Mutex::new(())) })
            .await
    }
}

/// Trimmed value of a required text field.
fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
