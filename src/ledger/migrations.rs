//! Forward-only schema migrations for the run ledger.
//!
//! Each migration is a list of statements applied in one transaction
//! together with its `ledger_schema` row, so a crash mid-migration leaves
//! the previous version intact.

use crate::error::{Result, ZeusError};
use sqlx::sqlite::SqlitePool;
use tracing::info;

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

// Runs reference definitions by id without a foreign key: ad-hoc runs have
// no definition, and cascading deletes are issued explicitly.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "query definitions and runs",
    statements: &[
        r#"
        CREATE TABLE query_definitions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sql TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE query_runs (
            id TEXT PRIMARY KEY,
            query_id TEXT,
            sql TEXT NOT NULL,
            execution_id TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL
                CHECK (status IN ('QUEUED', 'RUNNING', 'SUCCEEDED', 'FAILED', 'CANCELLED')),
            results_location TEXT,
            error_message TEXT,
            parameters TEXT,
            executed_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
        "CREATE INDEX idx_query_runs_query ON query_runs(query_id, executed_at)",
    ],
}];

fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Brings the ledger schema up to the latest version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ledger_schema (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to create ledger_schema table: {e}")))?;

    let current = schema_version(pool).await?;
    let latest = latest_version();
    if current > latest {
        return Err(ZeusError::persistence(format!(
            "Ledger schema version {current} is newer than this build supports ({latest}). \
             Upgrade Zeus to open it."
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(pool, migration).await?;
        info!(
            "Applied ledger migration v{} ({})",
            migration.version, migration.description
        );
    }

    Ok(())
}

async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let (version,): (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM ledger_schema")
        .fetch_one(pool)
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to read schema version: {e}")))?;
    Ok(version.unwrap_or(0))
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let fail = |e: sqlx::Error| {
        ZeusError::persistence(format!(
            "Ledger migration v{} failed: {e}",
            migration.version
        ))
    };

    let mut tx = pool.begin().await.map_err(fail)?;
    for statement in migration.statements {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
    }
    sqlx::query("INSERT INTO ledger_schema (version) VALUES (?)")
        .bind(migration.version)
        .execute(&mut *tx)
        .await
        .map_err(fail)?;
    tx.commit().await.map_err(fail)
}
