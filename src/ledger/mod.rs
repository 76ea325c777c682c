//! Run ledger for Zeus.
//!
//! Durable local record of query definitions and every execution attempt,
//! kept in SQLite. The execution service remains the authority on a run's
//! state; the ledger caches it and enforces that terminal fields are
//! written once.

pub mod definitions;
mod migrations;
pub mod runs;

pub use definitions::{DefinitionUpdate, NewDefinition, QueryDefinition};
pub use runs::{NewRun, QueryRun, Transition};

use crate::error::{Result, ZeusError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Current time at the precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp as fixed-width RFC 3339, so text order is time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ZeusError::persistence(format!("Corrupt timestamp '{raw}': {e}")))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ZeusError::persistence(format!("Corrupt id '{raw}': {e}")))
}

/// Only an unreadable file is moved aside. Anything else, such as a schema
/// from a newer build, is reported and the file left untouched.
fn is_corruption(err: &ZeusError) -> bool {
    let message = err.to_string();
    message.contains("not a database") || message.contains("malformed")
}

/// Handle to the run ledger database.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl Ledger {
    /// Opens or creates the ledger at the default platform path.
    ///
    /// - Linux: `~/.local/share/zeus/ledger.db`
    /// - macOS: `~/Library/Application Support/zeus/ledger.db`
    /// - Windows: `%APPDATA%\zeus\ledger.db`
    pub async fn open_default() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open(&path).await
    }

    /// Opens or creates the ledger at the specified path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::ensure_parent_dirs(path)?;

        match Self::try_open(path).await {
            Ok(ledger) => Ok(ledger),
            Err(e) if is_corruption(&e) => {
                warn!("Run ledger is corrupt: {e}. Attempting recovery...");
                Self::attempt_recovery(path).await
            }
            Err(e) => Err(e),
        }
    }

    /// Opens a private in-memory ledger. Contents are lost when it is dropped.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ZeusError::persistence(format!("Failed to open in-memory ledger: {e}")))?;
        migrations::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            db_path: None,
        })
    }

    /// Returns the default ledger path for the current platform.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ZeusError::persistence("Could not determine data directory"))?;
        Ok(data_dir.join("zeus").join("ledger.db"))
    }

    /// Attempts to open the database with retries for lock contention.
    async fn try_open(path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Run ledger opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        db_path: Some(path.to_path_buf()),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ZeusError::persistence("Failed to open ledger after retries")))
    }

    /// Creates a connection pool to the SQLite database.
    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| ZeusError::persistence(format!("Invalid ledger path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| ZeusError::persistence(format!("Failed to connect to run ledger: {e}")))
    }

    /// Ensures parent directories exist for the database path.
    fn ensure_parent_dirs(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ZeusError::persistence(format!(
                    "Failed to create ledger directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Attempts to recover from a corrupted database by backing up and recreating.
    async fn attempt_recovery(path: &Path) -> Result<Self> {
        let backup_path = path.with_extension("db.bak");

        if path.exists() {
            std::fs::rename(path, &backup_path).map_err(|e| {
                ZeusError::persistence(format!(
                    "Failed to backup corrupted ledger to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up corrupted ledger to {}", backup_path.display());
        }

        Self::try_open(path).await.map_err(|e| {
            ZeusError::persistence(format!("Failed to recreate ledger after backup: {e}"))
        })
    }

    /// Returns the on-disk path, or `None` for in-memory ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
