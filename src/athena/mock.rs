//! Mock execution service for testing.
//!
//! Keeps executions in memory, lets tests drive each one through the
//! lifecycle, and counts every remote call so tests can assert how many
//! round trips an operation made.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{
    ExecutionHandle, ExecutionService, ExecutionStatus, LifecycleState, RawRow, ResultBatch,
    ServiceError, ServiceResult, MAX_RESULTS_PER_CALL,
};

#[derive(Debug, Clone)]
struct MockExecution {
    sql: String,
    status: ExecutionStatus,
    /// Header row followed by data rows.
    rows: Vec<RawRow>,
}

#[derive(Debug, Default)]
struct MockState {
    executions: HashMap<ExecutionHandle, MockExecution>,
    next_id: usize,
    unavailable: bool,
    reject_submissions: Option<String>,
}

/// An in-memory execution service with scripted lifecycle transitions.
#[derive(Debug, Default)]
pub struct MockExecutionService {
    state: Mutex<MockState>,
    start_calls: AtomicUsize,
    describe_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockExecutionService {
    /// Creates an empty mock service.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an execution directly, bypassing submission.
    pub fn insert_execution(&self, handle: impl Into<ExecutionHandle>, status: ExecutionStatus) {
        self.lock().executions.insert(
            handle.into(),
            MockExecution {
                sql: String::new(),
                status,
                rows: Vec::new(),
            },
        );
    }

    /// Moves an execution to `state`, optionally with a reason string.
    pub fn set_state(&self, handle: &ExecutionHandle, state: LifecycleState, reason: Option<&str>) {
        if let Some(execution) = self.lock().executions.get_mut(handle) {
            execution.status.state = state;
            execution.status.reason = reason.map(str::to_string);
        }
    }

    /// Replaces the reported output location of an execution.
    pub fn set_output_location(&self, handle: &ExecutionHandle, location: Option<&str>) {
        if let Some(execution) = self.lock().executions.get_mut(handle) {
            execution.status.output_location = location.map(str::to_string);
        }
    }

    /// Sets the result stream of an execution: a header row, then data rows.
    pub fn set_results(&self, handle: &ExecutionHandle, header: &[&str], data: Vec<RawRow>) {
        if let Some(execution) = self.lock().executions.get_mut(handle) {
            let mut rows = Vec::with_capacity(data.len() + 1);
            rows.push(header.iter().map(|h| Some(h.to_string())).collect());
            rows.extend(data);
            execution.rows = rows;
        }
    }

    /// Sets a raw result stream, header row included (or absent entirely).
    pub fn set_raw_rows(&self, handle: &ExecutionHandle, rows: Vec<RawRow>) {
        if let Some(execution) = self.lock().executions.get_mut(handle) {
            execution.rows = rows;
        }
    }

    /// Makes every subsequent call fail as if the service were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Makes every subsequent submission fail with the given message.
    pub fn reject_submissions(&self, message: impl Into<String>) {
        self.lock().reject_submissions = Some(message.into());
    }

    /// Returns the SQL submitted for an execution.
    pub fn submitted_sql(&self, handle: &ExecutionHandle) -> Option<String> {
        self.lock().executions.get(handle).map(|e| e.sql.clone())
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn check_available(state: &MockState) -> ServiceResult<()> {
        if state.unavailable {
            return Err(ServiceError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn not_found(handle: &ExecutionHandle) -> ServiceError {
        ServiceError::Rejected(format!("QueryExecution {handle} was not found"))
    }
}

#[async_trait]
impl ExecutionService for MockExecutionService {
    async fn start_query(
        &self,
        sql: &str,
        output_location: &str,
    ) -> ServiceResult<ExecutionHandle> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        Self::check_available(&state)?;
        if let Some(message) = &state.reject_submissions {
            return Err(ServiceError::Rejected(message.clone()));
        }

        state.next_id += 1;
        let handle = ExecutionHandle::new(format!("exec-{:04}", state.next_id));
        let separator = if output_location.ends_with('/') { "" } else { "/" };
        let location = format!("{output_location}{separator}{handle}.csv");

        state.executions.insert(
            handle.clone(),
            MockExecution {
                sql: sql.to_string(),
                status: ExecutionStatus::new(LifecycleState::Queued).with_output_location(location),
                rows: Vec::new(),
            },
        );
        Ok(handle)
    }

    async fn describe(&self, handle: &ExecutionHandle) -> ServiceResult<ExecutionStatus> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        Self::check_available(&state)?;
        state
            .executions
            .get(handle)
            .map(|e| e.status.clone())
            .ok_or_else(|| Self::not_found(handle))
    }

    async fn fetch_results(
        &self,
        handle: &ExecutionHandle,
        max_results: usize,
        next_token: Option<&str>,
    ) -> ServiceResult<ResultBatch> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        Self::check_available(&state)?;
        let execution = state
            .executions
            .get(handle)
            .ok_or_else(|| Self::not_found(handle))?;

        if execution.status.state != LifecycleState::Succeeded {
            return Err(ServiceError::Rejected(format!(
                "Query has not yet finished. Current state: {}",
                execution.status.state
            )));
        }

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ServiceError::Rejected(format!("invalid next token '{token}'")))?,
            None => 0,
        };
        let start = start.min(execution.rows.len());
        let end = (start + max_results.clamp(1, MAX_RESULTS_PER_CALL)).min(execution.rows.len());

        Ok(ResultBatch {
            rows: execution.rows[start..end].to_vec(),
            next_token: (end < execution.rows.len()).then(|| end.to_string()),
        })
    }
}
