//! Integration tests for the on-disk run ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tempfile::tempdir;
use zeus::athena::{
    ExecutionHandle, ExecutionService, ExecutionStatus, LifecycleState, MockExecutionService,
};
use zeus::ledger::{definitions, runs, Ledger, NewDefinition, NewRun, Transition};
use zeus::query::reconciler;

fn new_definition(name: &str) -> NewDefinition {
    NewDefinition {
        name: name.to_string(),
        sql: "SELECT * FROM events WHERE day = '{{day}}'".to_string(),
        description: "Daily events".to_string(),
    }
}

#[tokio::test]
async fn test_ledger_file_is_created() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("ledger.db");

    let ledger = Ledger::open(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(ledger.path(), Some(path.as_path()));
    ledger.close().await;
}

#[tokio::test]
async fn test_runs_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let (definition_id, run_id) = {
        let ledger = Ledger::open(&path).await.unwrap();
        let definition = definitions::create_definition(ledger.pool(), &new_definition("daily"))
            .await
            .unwrap();

        let mut parameters = BTreeMap::new();
        parameters.insert("day".to_string(), "2024-01-01".to_string());
        let run = runs::insert_run(
            ledger.pool(),
            NewRun {
                query_id: Some(definition.id),
                sql: "SELECT * FROM events WHERE day = '2024-01-01'".to_string(),
                execution_id: ExecutionHandle::new("exec-1"),
                parameters: Some(parameters),
            },
        )
        .await
        .unwrap();

        let status = ExecutionStatus::new(LifecycleState::Succeeded)
            .with_output_location("s3://bucket/exec-1.csv");
        let applied = runs::apply_transition(
            ledger.pool(),
            run.id,
            &Transition::from_status(&status, Utc::now()),
        )
        .await
        .unwrap();
        assert!(applied);

        ledger.close().await;
        (definition.id, run.id)
    };

    let ledger = Ledger::open(&path).await.unwrap();
    let run = runs::get_run(ledger.pool(), run_id).await.unwrap().unwrap();
    assert_eq!(run.query_id, Some(definition_id));
    assert_eq!(run.status, LifecycleState::Succeeded);
    assert_eq!(run.results_location.as_deref(), Some("s3://bucket/exec-1.csv"));
    assert!(run.completed_at.is_some());
    assert_eq!(
        run.parameters
            .as_ref()
            .and_then(|p| p.get("day"))
            .map(String::as_str),
        Some("2024-01-01")
    );

    let by_handle = runs::get_run_by_execution_id(ledger.pool(), &ExecutionHandle::new("exec-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_handle.id, run_id);
    ledger.close().await;
}

#[tokio::test]
async fn test_terminal_state_is_not_overwritten_after_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let ledger = Ledger::open(&path).await.unwrap();

    let run = runs::insert_run(
        ledger.pool(),
        NewRun {
            query_id: None,
            sql: "SELECT 1".to_string(),
            execution_id: ExecutionHandle::new("exec-2"),
            parameters: None,
        },
    )
    .await
    .unwrap();

    let failed = ExecutionStatus::new(LifecycleState::Failed).with_reason("SYNTAX_ERROR");
    assert!(runs::apply_transition(
        ledger.pool(),
        run.id,
        &Transition::from_status(&failed, Utc::now())
    )
    .await
    .unwrap());
    ledger.close().await;

    let ledger = Ledger::open(&path).await.unwrap();
    let succeeded = ExecutionStatus::new(LifecycleState::Succeeded);
    let applied = runs::apply_transition(
        ledger.pool(),
        run.id,
        &Transition::from_status(&succeeded, Utc::now()),
    )
    .await
    .unwrap();
    assert!(!applied);

    let stored = runs::get_run(ledger.pool(), run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, LifecycleState::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("SYNTAX_ERROR"));
    ledger.close().await;
}

#[tokio::test]
async fn test_delete_definition_removes_only_its_runs() {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await.unwrap();
    let pool = ledger.pool();

    let keep = definitions::create_definition(pool, &new_definition("keep"))
        .await
        .unwrap();
    let remove = definitions::create_definition(pool, &new_definition("remove"))
        .await
        .unwrap();

    for (i, query_id) in [remove.id, remove.id, keep.id].into_iter().enumerate() {
        runs::insert_run(
            pool,
            NewRun {
                query_id: Some(query_id),
                sql: "SELECT 1".to_string(),
                execution_id: ExecutionHandle::new(format!("exec-{i}")),
                parameters: None,
            },
        )
        .await
        .unwrap();
    }
    let adhoc = runs::insert_run(
        pool,
        NewRun {
            query_id: None,
            sql: "SELECT 2".to_string(),
            execution_id: ExecutionHandle::new("exec-adhoc"),
            parameters: None,
        },
    )
    .await
    .unwrap();

    let deleted = definitions::delete_definition(pool, remove.id).await.unwrap();
    assert_eq!(deleted, Some(2));

    assert!(definitions::get_definition(pool, remove.id)
        .await
        .unwrap()
        .is_none());
    assert!(runs::list_runs_for_definition(pool, remove.id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        runs::list_runs_for_definition(pool, keep.id)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(runs::get_run(pool, adhoc.id).await.unwrap().is_some());

    assert_eq!(
        definitions::delete_definition(pool, remove.id).await.unwrap(),
        None
    );
    ledger.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_on_disk_converges() {
    let dir = tempdir().unwrap();
    let ledger = Ledger::open(&dir.path().join("ledger.db")).await.unwrap();
    let service = Arc::new(MockExecutionService::new());

    let handle = service
        .start_query("SELECT 1", "s3://bucket/out/")
        .await
        .unwrap();
    let run = runs::insert_run(
        ledger.pool(),
        NewRun {
            query_id: None,
            sql: "SELECT 1".to_string(),
            execution_id: handle.clone(),
            parameters: None,
        },
    )
    .await
    .unwrap();

    service.set_state(&handle, LifecycleState::Running, None);
    let run = reconciler::reconcile_run(service.as_ref(), ledger.pool(), run)
        .await
        .unwrap();
    assert_eq!(run.status, LifecycleState::Running);

    service.set_state(&handle, LifecycleState::Succeeded, None);
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            let pool = ledger.pool().clone();
            let run = run.clone();
            tokio::spawn(async move {
                reconciler::reconcile_run(service.as_ref(), &pool, run).await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    let stored = runs::get_run(ledger.pool(), run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, LifecycleState::Succeeded);
    assert!(stored.completed_at.is_some());
    assert_eq!(
        stored.results_location,
        Some(format!("s3://bucket/out/{handle}.csv"))
    );
    for outcome in &outcomes {
        assert_eq!(outcome, &stored);
    }

    ledger.close().await;
}
