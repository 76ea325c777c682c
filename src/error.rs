//! Error types for Zeus.
//!
//! Defines the main error enum used throughout the application. Each variant
//! corresponds to one failure category a request can end in; nothing here is
//! fatal to the process.

use thiserror::Error;

/// Main error type for Zeus operations.
#[derive(Error, Debug)]
pub enum ZeusError {
    /// Rejected input (malformed identity, missing SQL, unresolved parameters).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A query definition or run does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The execution service refused or failed to accept a query.
    #[error("Submission error: {0}")]
    Submission(String),

    /// The execution service could not be reached while refreshing a run's state.
    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    /// Fetching or decoding a page of results failed.
    #[error("Results error: {0}")]
    ResultsFetch(String),

    /// The result location of an execution could not be resolved.
    #[error("Export error: {0}")]
    ExportLocation(String),

    /// The result object could not be read from the object store.
    #[error("Export fetch error: {0}")]
    ExportFetch(String),

    /// Run ledger errors (database unavailable, corrupt rows, etc.)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ZeusError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a submission error with the given message.
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    /// Creates a reconciliation error with the given message.
    pub fn reconcile(msg: impl Into<String>) -> Self {
        Self::Reconcile(msg.into())
    }

    /// Creates a results-fetch error with the given message.
    pub fn results_fetch(msg: impl Into<String>) -> Self {
        Self::ResultsFetch(msg.into())
    }

    /// Creates an export location error with the given message.
    pub fn export_location(msg: impl Into<String>) -> Self {
        Self::ExportLocation(msg.into())
    }

    /// Creates an export fetch error with the given message.
    pub fn export_fetch(msg: impl Into<String>) -> Self {
        Self::ExportFetch(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::NotFound(_) => "Not Found",
            Self::Submission(_) => "Submission Error",
            Self::Reconcile(_) => "Reconciliation Error",
            Self::ResultsFetch(_) => "Results Error",
            Self::ExportLocation(_) => "Export Error",
            Self::ExportFetch(_) => "Export Fetch Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Submission(msg)
            | Self::Reconcile(msg)
            | Self::ResultsFetch(msg)
            | Self::ExportLocation(msg)
            | Self::ExportFetch(msg)
            | Self::Persistence(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg,
        }
    }

    /// Returns true for failures caused by an unreachable or failing remote
    /// collaborator, which a later identical request may get past.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Reconcile(_) | Self::ResultsFetch(_) | Self::ExportFetch(_)
        )
    }
}

/// Result type alias using ZeusError.
pub type Result<T> = std::result::Result<T, ZeusError>;
