//! End-to-end query lifecycle through the query service.

use std::collections::BTreeMap;

use futures::TryStreamExt;
use zeus::athena::{ExecutionHandle, ExecutionStatus, LifecycleState};
use zeus::error::ZeusError;
use zeus::ledger::NewDefinition;
use zeus::objects::S3Location;
use zeus::query::{ExecuteRequest, PageRequest};

use super::{row, Harness, OUTPUT_LOCATION};

fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_definition_run_to_export() {
    let h = Harness::new().await;

    let definition = h
        .service
        .create_definition(&NewDefinition {
            name: "Daily signups".to_string(),
            sql: "SELECT user_id, plan FROM signups WHERE day = '{{day}}'".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();

    let run = h
        .service
        .execute_definition(
            definition.id,
            &ExecuteRequest {
                sql: None,
                parameters: params(&[("day", "2024-03-01")]),
            },
        )
        .await
        .unwrap();
    assert_eq!(run.status, LifecycleState::Queued);
    assert_eq!(run.query_id, Some(definition.id));
    assert_eq!(
        run.sql,
        "SELECT user_id, plan FROM signups WHERE day = '2024-03-01'"
    );
    assert_eq!(
        h.execution.submitted_sql(&run.execution_id).as_deref(),
        Some(run.sql.as_str())
    );

    // Still running: a status-only page, no result fetch.
    h.execution
        .set_state(&run.execution_id, LifecycleState::Running, None);
    let page = h
        .service
        .results(&run.execution_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.status, LifecycleState::Running);
    assert!(page.columns.is_empty());
    assert_eq!(h.execution.fetch_calls(), 0);

    h.execution.set_results(
        &run.execution_id,
        &["user_id", "plan"],
        (1..=5).map(|i| row(&[&i.to_string(), "pro"])).collect(),
    );
    h.execution
        .set_state(&run.execution_id, LifecycleState::Succeeded, None);

    let page = h
        .service
        .results(&run.execution_id, PageRequest::new(2, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(page.status, LifecycleState::Succeeded);
    assert_eq!(page.columns, vec!["user_id", "plan"]);
    assert_eq!(page.rows, vec![vec!["3", "pro"], vec!["4", "pro"]]);
    assert_eq!(page.total, 2);
    assert!(page.completed_at.is_some());

    let runs = h.service.list_runs(definition.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run.status, LifecycleState::Succeeded);
    let location = runs[0].run.results_location.clone().unwrap();
    assert_eq!(location, format!("{OUTPUT_LOCATION}{}.csv", run.execution_id));

    let csv = "user_id,plan\n1,pro\n2,pro\n3,pro\n4,pro\n5,pro\n";
    h.objects.put(S3Location::parse(&location).unwrap(), csv);

    let describes_before = h.execution.describe_calls();
    let export = h.service.export(&run.execution_id).await.unwrap();
    let chunks: Vec<_> = export.body.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), csv.as_bytes());
    assert_eq!(h.execution.describe_calls(), describes_before);
}

#[tokio::test]
async fn test_failed_execution_is_recorded_once() {
    let h = Harness::new().await;

    let run = h
        .service
        .execute_adhoc(&ExecuteRequest {
            sql: Some("SELECT * FROM missing_table".to_string()),
            parameters: BTreeMap::new(),
        })
        .await
        .unwrap();
    assert_eq!(run.query_id, None);

    h.execution.set_state(
        &run.execution_id,
        LifecycleState::Failed,
        Some("TABLE_NOT_FOUND: line 1:15: Table 'missing_table' does not exist"),
    );

    let page = h
        .service
        .results(&run.execution_id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.status, LifecycleState::Failed);
    assert!(page
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("TABLE_NOT_FOUND"));

    let first = h.service.get_run(run.id).await.unwrap();
    let completed_at = first.completed_at.unwrap();

    // A later, different report from the service does not rewrite history.
    h.execution
        .set_state(&run.execution_id, LifecycleState::Failed, Some("other"));
    h.service
        .results(&run.execution_id, PageRequest::default())
        .await
        .unwrap();
    let second = h.service.get_run(run.id).await.unwrap();
    assert_eq!(second.completed_at, Some(completed_at));
    assert_eq!(second.error_message, first.error_message);

    let err = h.service.export(&run.execution_id).await.unwrap_err();
    assert!(matches!(err, ZeusError::ExportLocation(_)));
}

#[tokio::test]
async fn test_missing_parameters_submit_nothing() {
    let h = Harness::new().await;

    let err = h
        .service
        .execute_adhoc(&ExecuteRequest {
            sql: Some("SELECT * FROM t WHERE a = {{a}} AND b = {{b}}".to_string()),
            parameters: params(&[("a", "1"), ("b", "  ")]),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ZeusError::Validation(_)));
    assert!(err.to_string().contains('b'));
    assert_eq!(h.execution.start_calls(), 0);
}

#[tokio::test]
async fn test_rejected_submission_records_no_run() {
    let h = Harness::new().await;
    let definition = h
        .service
        .create_definition(&NewDefinition {
            name: "broken".to_string(),
            sql: "SELEC 1".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    h.execution
        .reject_submissions("line 1:1: mismatched input 'SELEC'");

    let err = h
        .service
        .execute_definition(definition.id, &ExecuteRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ZeusError::Submission(_)));
    assert!(h.service.list_runs(definition.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_untracked_execution_is_served_without_ledger_writes() {
    let h = Harness::new().await;
    let handle = ExecutionHandle::new("console-started");
    h.execution
        .insert_execution(handle.clone(), ExecutionStatus::new(LifecycleState::Succeeded));
    h.execution.set_results(&handle, &["n"], vec![row(&["7"])]);

    let page = h
        .service
        .results(&handle, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.rows, vec![vec!["7"]]);

    // No output location reported and nothing in the ledger.
    let err = h.service.export(&handle).await.unwrap_err();
    assert!(matches!(err, ZeusError::ExportLocation(_)));

    let location = "s3://console-results/console-started.csv";
    h.execution.set_output_location(&handle, Some(location));
    h.objects.put(S3Location::parse(location).unwrap(), "n\n7\n");

    let export = h.service.export(&handle).await.unwrap();
    assert_eq!(export.location.to_string(), location);
    let chunks: Vec<_> = export.body.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"n\n7\n");
}

#[tokio::test]
async fn test_runs_listing_survives_unavailable_service() {
    let h = Harness::new().await;
    let definition = h
        .service
        .create_definition(&NewDefinition {
            name: "n".to_string(),
            sql: "SELECT 1".to_string(),
            description: String::new(),
        })
        .await
        .unwrap();
    h.service
        .execute_definition(definition.id, &ExecuteRequest::default())
        .await
        .unwrap();

    h.execution.set_unavailable(true);
    let runs = h.service.list_runs(definition.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run.status, LifecycleState::Queued);
    assert!(runs[0].refresh_error.is_some());

    let err = h
        .service
        .results(&runs[0].run.execution_id, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ZeusError::Reconcile(_)));
}
