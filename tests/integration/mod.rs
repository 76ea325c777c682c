//! Integration tests for Zeus.

pub mod api_test;
pub mod ledger_test;
pub mod lifecycle_test;

use std::sync::Arc;

use zeus::athena::MockExecutionService;
use zeus::ledger::Ledger;
use zeus::objects::MockObjectStore;
use zeus::query::QueryService;

pub const OUTPUT_LOCATION: &str = "s3://zeus-results/athena/";

/// A query service over mocks, with handles to drive them.
pub struct Harness {
    pub execution: Arc<MockExecutionService>,
    pub objects: Arc<MockObjectStore>,
    pub service: Arc<QueryService>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_ledger(Ledger::open_in_memory().await.unwrap()).await
    }

    pub async fn with_ledger(ledger: Ledger) -> Self {
        let execution = Arc::new(MockExecutionService::new());
        let objects = Arc::new(MockObjectStore::new().with_chunk_size(16));
        let service = Arc::new(QueryService::new(
            execution.clone(),
            objects.clone(),
            ledger,
            OUTPUT_LOCATION,
        ));
        Self {
            execution,
            objects,
            service,
        }
    }
}

/// Builds a data row from present cells.
pub fn row(cells: &[&str]) -> Vec<Option<String>> {
    cells.iter().map(|c| Some(c.to_string())).collect()
}
