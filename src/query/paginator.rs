//! Result pagination.
//!
//! Pages are assembled by walking the execution service's continuation
//! tokens from the start of the result stream. The first row of the stream
//! is the header; every absent cell decodes to an empty string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::athena::{ExecutionHandle, ExecutionService, LifecycleState, RawRow, MAX_RESULTS_PER_CALL};
use crate::error::{Result, ZeusError};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// One page of decoded results, or a status-only page for unfinished runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Number of rows in this page.
    pub total: usize,
    pub page: u32,
    pub size: u32,
    pub status: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResultPage {
    /// A page carrying only lifecycle state: no columns, no rows.
    pub fn status_only(state: LifecycleState, request: PageRequest) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            total: 0,
            page: request.page,
            size: request.size,
            status: state,
            error_message: None,
            completed_at: None,
        }
    }

    pub fn with_error_message(mut self, message: Option<String>) -> Self {
        self.error_message = message;
        self
    }

    pub fn with_completed_at(mut self, completed_at: Option<DateTime<Utc>>) -> Self {
        self.completed_at = completed_at;
        self
    }
}

/// A validated 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Validates raw page and size values. Both must be at least 1.
    pub fn new(page: i64, size: i64) -> Result<Self> {
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ZeusError::validation(format!("page must be at least 1, got {page}")))?;
        let size = u32::try_from(size)
            .ok()
            .filter(|s| *s >= 1)
            .ok_or_else(|| ZeusError::validation(format!("size must be at least 1, got {size}")))?;
        Ok(Self { page, size })
    }

    /// Number of data rows before the first row of this page.
    fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.size as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE as u32,
            size: DEFAULT_PAGE_SIZE as u32,
        }
    }
}

fn decode_row(row: RawRow) -> Vec<String> {
    row.into_iter().map(Option::unwrap_or_default).collect()
}

/// Fetches one page of a SUCCEEDED execution's results.
///
/// Each call to the service asks for no more rows than the page still needs,
/// capped at [`MAX_RESULTS_PER_CALL`]. Failures surface as `ResultsFetch`.
pub async fn fetch_page(
    service: &dyn ExecutionService,
    handle: &ExecutionHandle,
    request: PageRequest,
) -> Result<ResultPage> {
    let skip = request.offset();
    let size = request.size as usize;

    let mut columns: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(size.min(MAX_RESULTS_PER_CALL));
    let mut position = 0usize;
    let mut token: Option<String> = None;

    loop {
        let header_pending = usize::from(columns.is_none());
        let needed = (skip + size).saturating_sub(position) + header_pending;
        let batch = service
            .fetch_results(handle, needed.min(MAX_RESULTS_PER_CALL), token.as_deref())
            .await
            .map_err(|e| ZeusError::results_fetch(format!("Failed to get query results: {e}")))?;

        let mut batch_rows = batch.rows.into_iter();
        if columns.is_none() {
            if let Some(header) = batch_rows.next() {
                columns = Some(decode_row(header));
            }
        }

        for raw in batch_rows {
            if position >= skip && rows.len() < size {
                rows.push(decode_row(raw));
            }
            position += 1;
        }

        if rows.len() >= size {
            break;
        }

        match batch.next_token {
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                return Err(ZeusError::results_fetch(format!(
                    "Continuation token did not advance for {handle}"
                )));
            }
            Some(next) => token = Some(next),
            None => break,
        }
    }

    let total = rows.len();
    Ok(ResultPage {
        columns: columns.unwrap_or_default(),
        rows,
        total,
        page: request.page,
        size: request.size,
        status: LifecycleState::Succeeded,
        error_message: None,
        completed_at: None,
    })
}
