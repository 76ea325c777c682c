//! Query service: the engine's single entry point.
//!
//! Owns the collaborators (execution service, object store, ledger) and the
//! output location, and composes submission, reconciliation, pagination and
//! export into the operations the HTTP surface exposes.

use futures::future;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::exporter::{self, ExportStream};
use super::paginator::{self, PageRequest, ResultPage};
use super::{reconciler, submitter, template};
use crate::athena::{ExecutionHandle, ExecutionService, LifecycleState};
use crate::error::{Result, ZeusError};
use crate::ledger::{
    definitions, runs, DefinitionUpdate, Ledger, NewDefinition, NewRun, QueryDefinition, QueryRun,
};
use crate::objects::ObjectStore;

/// A run as returned by the runs listing.
///
/// `refresh_error` is set when the run could not be reconciled during this
/// read; the rest of the record is then the last known state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    #[serde(flatten)]
    pub run: QueryRun,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

/// Request to execute SQL, ad hoc or for a saved definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// SQL to run. For definitions, falls back to the stored SQL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

pub struct QueryService {
    execution: Arc<dyn ExecutionService>,
    objects: Arc<dyn ObjectStore>,
    ledger: Ledger,
    output_location: String,
}

impl QueryService {
    pub fn new(
        execution: Arc<dyn ExecutionService>,
        objects: Arc<dyn ObjectStore>,
        ledger: Ledger,
        output_location: impl Into<String>,
    ) -> Self {
        Self {
            execution,
            objects,
            ledger,
            output_location: output_location.into(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Where the execution service is asked to write results.
    pub fn output_location(&self) -> &str {
        &self.output_location
    }

    // Definitions

    pub async fn list_definitions(&self) -> Result<Vec<QueryDefinition>> {
        definitions::list_definitions(self.ledger.pool()).await
    }

    pub async fn get_definition(&self, id: Uuid) -> Result<QueryDefinition> {
        definitions::get_definition(self.ledger.pool(), id)
            .await?
            .ok_or_else(|| definition_not_found(id))
    }

    pub async fn create_definition(&self, definition: &NewDefinition) -> Result<QueryDefinition> {
        definitions::create_definition(self.ledger.pool(), definition).await
    }

    pub async fn update_definition(
        &self,
        id: Uuid,
        update: &DefinitionUpdate,
    ) -> Result<QueryDefinition> {
        definitions::update_definition(self.ledger.pool(), id, update)
            .await?
            .ok_or_else(|| definition_not_found(id))
    }

    /// Deletes a definition and its runs. Returns the number of runs deleted.
    pub async fn delete_definition(&self, id: Uuid) -> Result<u64> {
        definitions::delete_definition(self.ledger.pool(), id)
            .await?
            .ok_or_else(|| definition_not_found(id))
    }

    // Execution

    /// Executes a saved definition and records the run.
    pub async fn execute_definition(&self, id: Uuid, request: &ExecuteRequest) -> Result<QueryRun> {
        let definition = self.get_definition(id).await?;
        let sql = match &request.sql {
            Some(sql) if !sql.trim().is_empty() => sql.as_str(),
            _ => definition.sql.as_str(),
        };
        self.execute(Some(id), sql, &request.parameters).await
    }

    /// Executes SQL that belongs to no definition and records the run.
    pub async fn execute_adhoc(&self, request: &ExecuteRequest) -> Result<QueryRun> {
        let sql = request.sql.as_deref().unwrap_or_default();
        self.execute(None, sql, &request.parameters).await
    }

    async fn execute(
        &self,
        query_id: Option<Uuid>,
        sql: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<QueryRun> {
        if sql.trim().is_empty() {
            return Err(ZeusError::validation("SQL is required"));
        }
        let rendered = template::render(sql, parameters)?;
        let handle =
            submitter::submit(self.execution.as_ref(), &rendered, &self.output_location).await?;

        let new_run = NewRun {
            query_id,
            sql: rendered,
            execution_id: handle.clone(),
            parameters: (!parameters.is_empty()).then(|| parameters.clone()),
        };
        runs::insert_run(self.ledger.pool(), new_run)
            .await
            .inspect_err(|e| error!("Execution {handle} was submitted but not recorded: {e}"))
    }

    // Runs

    /// Lists a definition's runs, most recent first, refreshing unfinished ones.
    ///
    /// A run that cannot be refreshed is still listed, with `refresh_error` set.
    pub async fn list_runs(&self, query_id: Uuid) -> Result<Vec<RunSnapshot>> {
        self.get_definition(query_id).await?;
        let stored = runs::list_runs_for_definition(self.ledger.pool(), query_id).await?;

        let refreshes = stored.into_iter().map(|run| async move {
            let fallback = run.clone();
            match reconciler::reconcile_run(self.execution.as_ref(), self.ledger.pool(), run).await
            {
                Ok(run) => RunSnapshot {
                    run,
                    refresh_error: None,
                },
                Err(e) => {
                    warn!("Could not refresh run {}: {e}", fallback.id);
                    RunSnapshot {
                        run: fallback,
                        refresh_error: Some(e.to_string()),
                    }
                }
            }
        });

        Ok(future::join_all(refreshes).await)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<QueryRun> {
        runs::get_run(self.ledger.pool(), id)
            .await?
            .ok_or_else(|| ZeusError::not_found(format!("Query run {id} not found")))
    }

    pub async fn delete_run(&self, id: Uuid) -> Result<()> {
        if runs::delete_run(self.ledger.pool(), id).await? {
            Ok(())
        } else {
            Err(ZeusError::not_found(format!("Query run {id} not found")))
        }
    }

    // Results

    /// Returns a page of results, or a status-only page if the execution has
    /// not succeeded.
    pub async fn results(&self, handle: &ExecutionHandle, request: PageRequest) -> Result<ResultPage> {
        let observation =
            reconciler::observe(self.execution.as_ref(), self.ledger.pool(), handle).await?;

        if observation.state != LifecycleState::Succeeded {
            return Ok(ResultPage::status_only(observation.state, request)
                .with_error_message(observation.error_message)
                .with_completed_at(observation.completed_at));
        }

        let page = paginator::fetch_page(self.execution.as_ref(), handle, request).await?;
        Ok(page.with_completed_at(observation.completed_at))
    }

    /// Opens the full result set of a SUCCEEDED execution for streaming.
    pub async fn export(&self, handle: &ExecutionHandle) -> Result<ExportStream> {
        let location =
            exporter::resolve_location(self.execution.as_ref(), self.ledger.pool(), handle).await?;
        exporter::open_export(self.objects.as_ref(), location).await
    }
}

fn definition_not_found(id: Uuid) -> ZeusError {
    ZeusError::not_found(format!("Query {id} not found"))
}
