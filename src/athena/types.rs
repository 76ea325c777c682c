//! Execution lifecycle and result batch types.
//!
//! Mirrors the subset of the execution service's model the engine relies on:
//! the lifecycle state machine, the opaque execution handle, a status
//! snapshot, and one batch of raw result rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a query execution, as reported by the execution service.
///
/// Ordered along the lifecycle: `Queued < Running < {Succeeded, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl LifecycleState {
    /// All states, in lifecycle order.
    pub const ALL: [LifecycleState; 5] = [
        Self::Queued,
        Self::Running,
        Self::Succeeded,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns the state as stored and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a state string. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Cancelled => 2,
        }
    }

    /// Returns true if a run currently in `self` may move to `next`.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        next.rank() > self.rank()
    }

    /// States from which a run may move into `self`.
    pub fn predecessors(&self) -> Vec<LifecycleState> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown lifecycle state: {s}"))
    }
}

/// Opaque identifier the execution service assigns to one submitted query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExecutionHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Snapshot of an execution's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: LifecycleState,
    /// Human-readable reason for the last state change, if the service gave one.
    pub reason: Option<String>,
    /// Where the service writes (or wrote) the full result set.
    pub output_location: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            state,
            reason: None,
            output_location: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_output_location(mut self, location: impl Into<String>) -> Self {
        self.output_location = Some(location.into());
        self
    }
}

/// A row as returned by the service: every cell is text or absent.
pub type RawRow = Vec<Option<String>>;

/// One batch of rows plus the continuation token for the next batch.
///
/// The first batch of a result stream starts with the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultBatch {
    pub rows: Vec<RawRow>,
    /// `None` once the end of the result stream is reached.
    pub next_token: Option<String>,
}

/// Failure talking to the execution service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached or answered with a transport-level failure.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service rejected the request (bad SQL, unknown execution, access denied).
    #[error("{0}")]
    Rejected(String),

    /// The service answered but the response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result type for execution service calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
