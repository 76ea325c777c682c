//! Query-execution reconciliation engine.
//!
//! Submission, status reconciliation, pagination and export, composed by
//! [`QueryService`].

pub mod exporter;
pub mod paginator;
pub mod reconciler;
pub mod service;
pub mod submitter;
pub mod template;

pub use exporter::ExportStream;
pub use paginator::{PageRequest, ResultPage};
pub use service::{ExecuteRequest, QueryService, RunSnapshot};
