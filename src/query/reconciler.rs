//! Status reconciliation.
//!
//! The execution service owns the real lifecycle state; the ledger caches it.
//! Reading a run that the ledger does not yet show as terminal refreshes it
//! with one describe call, and any forward move is written back through a
//! conditional update. Runs the ledger already shows as terminal are served
//! from the ledger without a remote call.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use crate::athena::{ExecutionHandle, ExecutionService, LifecycleState};
use crate::error::{Result, ZeusError};
use crate::ledger::{self, runs, QueryRun, Transition};

/// The best known state of an execution after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub state: LifecycleState,
    /// Reason text, set only for FAILED and CANCELLED.
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_location: Option<String>,
    /// The ledger record, if this execution is tracked.
    pub run: Option<QueryRun>,
}

impl Observation {
    fn from_run(run: QueryRun) -> Self {
        Self {
            state: run.status,
            error_message: run.error_message.clone(),
            completed_at: run.completed_at,
            output_location: run.results_location.clone(),
            run: Some(run),
        }
    }
}

/// Refreshes a single run from the execution service.
///
/// Returns the run as stored after the refresh. Remote failures leave the
/// ledger untouched and surface as `Reconcile` errors.
pub async fn reconcile_run(
    service: &dyn ExecutionService,
    pool: &SqlitePool,
    run: QueryRun,
) -> Result<QueryRun> {
    if run.status.is_terminal() {
        debug!(
            "Run {} already {}, skipping reconciliation",
            run.id, run.status
        );
        return Ok(run);
    }

    let status = service.describe(&run.execution_id).await.map_err(|e| {
        ZeusError::reconcile(format!(
            "Failed to get query execution {}: {e}",
            run.execution_id
        ))
    })?;

    if !run.status.can_transition_to(status.state) {
        return Ok(run);
    }

    let transition = Transition::from_status(&status, ledger::now());
    if runs::apply_transition(pool, run.id, &transition).await? {
        info!(
            "Run {} ({}) moved {} -> {}",
            run.id, run.execution_id, run.status, status.state
        );
    }

    // Re-read so concurrent reconcilers all report the one stored outcome.
    runs::get_run(pool, run.id)
        .await?
        .ok_or_else(|| ZeusError::not_found(format!("Query run {} no longer exists", run.id)))
}

/// Determines the current state of an execution by handle.
///
/// Tracked executions go through [`reconcile_run`]. Untracked handles are
/// described directly and nothing is written.
pub async fn observe(
    service: &dyn ExecutionService,
    pool: &SqlitePool,
    handle: &ExecutionHandle,
) -> Result<Observation> {
    if let Some(run) = runs::get_run_by_execution_id(pool, handle).await? {
        let run = reconcile_run(service, pool, run).await?;
        return Ok(Observation::from_run(run));
    }

    debug!("Execution {handle} is not in the ledger, describing directly");
    let status = service.describe(handle).await.map_err(|e| {
        ZeusError::reconcile(format!("Failed to get query execution {handle}: {e}"))
    })?;

    let error_message = match status.state {
        LifecycleState::Failed | LifecycleState::Cancelled => status.reason,
        _ => None,
    };

    Ok(Observation {
        state: status.state,
        error_message,
        completed_at: None,
        output_location: status.output_location,
        run: None,
    })
}
