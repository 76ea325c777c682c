//! Query run persistence.
//!
//! Each row records one submission to the execution service. Status only
//! moves forward along the lifecycle, and terminal fields are written once:
//! [`apply_transition`] performs a conditional update that matches only rows
//! still in a predecessor state, so concurrent reconcilers cannot regress or
//! overwrite a terminal run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{format_timestamp, now, parse_id, parse_timestamp};
use crate::athena::{ExecutionHandle, ExecutionStatus, LifecycleState};
use crate::error::{Result, ZeusError};

/// One recorded execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRun {
    pub id: Uuid,
    /// Owning definition, `None` for ad-hoc runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<Uuid>,
    /// SQL as submitted, after parameter substitution.
    pub sql: String,
    pub execution_id: ExecutionHandle,
    pub status: LifecycleState,
    #[serde(rename = "resultsS3Url", skip_serializing_if = "Option::is_none")]
    pub results_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
    pub executed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
struct RunRow {
    id: String,
    query_id: Option<String>,
    sql: String,
    execution_id: String,
    status: String,
    results_location: Option<String>,
    error_message: Option<String>,
    parameters: Option<String>,
    executed_at: String,
    completed_at: Option<String>,
}

impl TryFrom<RunRow> for QueryRun {
    type Error = ZeusError;

    fn try_from(row: RunRow) -> Result<Self> {
        let status = LifecycleState::parse(&row.status).ok_or_else(|| {
            ZeusError::persistence(format!("Corrupt run status '{}'", row.status))
        })?;
        let parameters = row
            .parameters
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| {
                    ZeusError::persistence(format!("Corrupt run parameters for {}: {e}", row.id))
                })
            })
            .transpose()?;

        Ok(Self {
            id: parse_id(&row.id)?,
            query_id: row.query_id.as_deref().map(parse_id).transpose()?,
            sql: row.sql,
            execution_id: ExecutionHandle::new(row.execution_id),
            status,
            results_location: row.results_location,
            error_message: row.error_message,
            parameters,
            executed_at: parse_timestamp(&row.executed_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

/// Fields for recording a freshly submitted run.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub query_id: Option<Uuid>,
    pub sql: String,
    pub execution_id: ExecutionHandle,
    pub parameters: Option<BTreeMap<String, String>>,
}

/// A forward move of a run's status plus the fields that accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: LifecycleState,
    pub completed_at: Option<DateTime<Utc>>,
    pub results_location: Option<String>,
    pub error_message: Option<String>,
}

impl Transition {
    /// Builds the transition a freshly observed status implies.
    ///
    /// Terminal states record `at` as the completion time. SUCCEEDED carries the
    /// result location; FAILED and CANCELLED carry the service's reason.
    pub fn from_status(status: &ExecutionStatus, at: DateTime<Utc>) -> Self {
        let state = status.state;
        Self {
            state,
            completed_at: state.is_terminal().then_some(at),
            results_location: match state {
                LifecycleState::Succeeded => status.output_location.clone(),
                _ => None,
            },
            error_message: match state {
                LifecycleState::Failed | LifecycleState::Cancelled => status.reason.clone(),
                _ => None,
            },
        }
    }
}

const RUN_COLUMNS: &str = "id, query_id, sql, execution_id, status, results_location, \
     error_message, parameters, executed_at, completed_at";

/// Records a new run in QUEUED state.
pub async fn insert_run(pool: &SqlitePool, run: NewRun) -> Result<QueryRun> {
    let parameters_json = run
        .parameters
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ZeusError::internal(format!("Failed to encode parameters: {e}")))?;

    let record = QueryRun {
        id: Uuid::new_v4(),
        query_id: run.query_id,
        sql: run.sql,
        execution_id: run.execution_id,
        status: LifecycleState::Queued,
        results_location: None,
        error_message: None,
        parameters: run.parameters,
        executed_at: now(),
        completed_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO query_runs (id, query_id, sql, execution_id, status, parameters, executed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.query_id.map(|id| id.to_string()))
    .bind(&record.sql)
    .bind(record.execution_id.as_str())
    .bind(record.status.as_str())
    .bind(parameters_json)
    .bind(format_timestamp(&record.executed_at))
    .execute(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to record run: {e}")))?;

    Ok(record)
}

/// Gets a run by ID.
pub async fn get_run(pool: &SqlitePool, id: Uuid) -> Result<Option<QueryRun>> {
    let row: Option<RunRow> =
        sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM query_runs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(pool)
            .await
            .map_err(|e| ZeusError::persistence(format!("Failed to get run: {e}")))?;

    row.map(QueryRun::try_from).transpose()
}

/// Gets the run recorded for an execution handle, if any.
pub async fn get_run_by_execution_id(
    pool: &SqlitePool,
    execution_id: &ExecutionHandle,
) -> Result<Option<QueryRun>> {
    let row: Option<RunRow> = sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM query_runs WHERE execution_id = ?"
    ))
    .bind(execution_id.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to get run: {e}")))?;

    row.map(QueryRun::try_from).transpose()
}

/// Lists runs of a definition, most recent first.
pub async fn list_runs_for_definition(pool: &SqlitePool, query_id: Uuid) -> Result<Vec<QueryRun>> {
    let rows: Vec<RunRow> = sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM query_runs WHERE query_id = ? \
         ORDER BY executed_at DESC, rowid DESC"
    ))
    .bind(query_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to list runs: {e}")))?;

    rows.into_iter().map(QueryRun::try_from).collect()
}

/// Moves a run forward to `transition.state`.
///
/// Matches only if the stored status is a predecessor of the target, so the
/// update is a no-op for runs already at or past it. Fields that are already
/// set are left alone. Returns true if the row changed.
pub async fn apply_transition(
    pool: &SqlitePool,
    run_id: Uuid,
    transition: &Transition,
) -> Result<bool> {
    let predecessors = transition.state.predecessors();
    if predecessors.is_empty() {
        return Ok(false);
    }

    let placeholders = vec!["?"; predecessors.len()].join(", ");
    let sql = format!(
        r#"
        UPDATE query_runs
        SET status = ?,
            completed_at = COALESCE(completed_at, ?),
            results_location = COALESCE(results_location, ?),
            error_message = COALESCE(error_message, ?)
        WHERE id = ? AND status IN ({placeholders})
        "#
    );

    let mut query = sqlx::query(&sql)
        .bind(transition.state.as_str())
        .bind(transition.completed_at.as_ref().map(format_timestamp))
        .bind(transition.results_location.as_deref())
        .bind(transition.error_message.as_deref())
        .bind(run_id.to_string());
    for state in &predecessors {
        query = query.bind(state.as_str());
    }

    let result = query
        .execute(pool)
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to update run status: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Records the result location of a SUCCEEDED run that has none.
///
/// The status is not touched and an existing location is never replaced.
/// Returns true if the row changed.
pub async fn record_results_location(
    pool: &SqlitePool,
    run_id: Uuid,
    location: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE query_runs
        SET results_location = COALESCE(results_location, ?)
        WHERE id = ? AND status = ? AND results_location IS NULL
        "#,
    )
    .bind(location)
    .bind(run_id.to_string())
    .bind(LifecycleState::Succeeded.as_str())
    .execute(pool)
    .await
    .map_err(|e| ZeusError::persistence(format!("Failed to record results location: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a run. Returns true if it existed.
pub async fn delete_run(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM query_runs WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to delete run: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes every run of a definition, returning how many were removed.
pub async fn delete_runs_for_definition<'e, E>(executor: E, query_id: Uuid) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM query_runs WHERE query_id = ?")
        .bind(query_id.to_string())
        .execute(executor)
        .await
        .map_err(|e| ZeusError::persistence(format!("Failed to delete runs: {e}")))?;

    Ok(result.rows_affected())
}
