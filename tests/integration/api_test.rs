//! HTTP API tests: routes, status codes and error bodies, plus the CLI
//! client against a live server.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::TryStreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use zeus::api::create_router;
use zeus::athena::{ExecutionHandle, LifecycleState};
use zeus::client::ZeusClient;
use zeus::config::ServerConfig;
use zeus::error::ZeusError;
use zeus::objects::S3Location;
use zeus::query::{ExecuteRequest, PageRequest};

use super::{row, Harness, OUTPUT_LOCATION};

fn router(h: &Harness) -> Router {
    create_router(h.service.clone(), &ServerConfig::default())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_definition_crud() {
    let h = Harness::new().await;

    let (status, created) = send_json(
        router(&h),
        "POST",
        "/api/queries",
        Some(json!({"name": "Top pages", "sql": "SELECT page FROM views LIMIT {{n}}"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["description"], "");
    assert!(created["createdAt"].is_string());

    let (status, updated) = send_json(
        router(&h),
        "PUT",
        &format!("/api/queries/{id}"),
        Some(json!({"description": "Most viewed pages"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Top pages");
    assert_eq!(updated["description"], "Most viewed pages");

    let (status, list) = send_json(router(&h), "GET", "/api/queries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, run) = send_json(
        router(&h),
        "POST",
        &format!("/api/queries/{id}/runs"),
        Some(json!({"parameters": {"n": "10"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(run["status"], "QUEUED");
    assert_eq!(run["queryId"], id.as_str());
    assert_eq!(run["sql"], "SELECT page FROM views LIMIT 10");

    let (status, deleted) =
        send_json(router(&h), "DELETE", &format!("/api/queries/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["deletedRuns"], 1);

    let (status, body) = send_json(router(&h), "GET", &format!("/api/queries/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_validation_errors() {
    let h = Harness::new().await;

    let (status, body) = send_json(
        router(&h),
        "POST",
        "/api/queries",
        Some(json!({"name": "  ", "sql": "SELECT 1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send_json(router(&h), "GET", "/api/queries/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send_json(
        router(&h),
        "POST",
        "/api/athena/execute",
        Some(json!({"sql": "SELECT {{missing}}"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing"));

    let (status, _) = send_json(
        router(&h),
        "GET",
        "/api/athena/results/exec-0001?page=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.execution.describe_calls(), 0);
    assert_eq!(h.execution.start_calls(), 0);
}

#[tokio::test]
async fn test_adhoc_execute_results_and_run_lookup() {
    let h = Harness::new().await;

    let (status, body) = send_json(
        router(&h),
        "POST",
        "/api/athena/execute",
        Some(json!({"sql": "SELECT 1 AS one"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let execution_id = body["executionId"].as_str().unwrap().to_string();
    let run_id = body["runId"].as_str().unwrap().to_string();

    let (status, page) = send_json(
        router(&h),
        "GET",
        &format!("/api/athena/results/{execution_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["status"], "QUEUED");
    assert_eq!(page["page"], 1);
    assert_eq!(page["size"], 50);

    let handle = ExecutionHandle::new(execution_id.as_str());
    h.execution.set_results(&handle, &["one"], vec![row(&["1"])]);
    h.execution
        .set_state(&handle, LifecycleState::Succeeded, None);

    let (status, page) = send_json(
        router(&h),
        "GET",
        &format!("/api/athena/results/{execution_id}?page=1&size=10"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["columns"], json!(["one"]));
    assert_eq!(page["rows"], json!([["1"]]));
    assert_eq!(page["status"], "SUCCEEDED");

    let (status, run) =
        send_json(router(&h), "GET", &format!("/api/query-runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "SUCCEEDED");
    assert!(run["resultsS3Url"].is_string());
    assert!(run.get("queryId").is_none());

    let (status, _) =
        send_json(router(&h), "DELETE", &format!("/api/query-runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        send_json(router(&h), "DELETE", &format!("/api/query-runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_export_headers_and_errors() {
    let h = Harness::new().await;

    let (_, body) = send_json(
        router(&h),
        "POST",
        "/api/athena/execute",
        Some(json!({"sql": "SELECT 1"})),
    )
    .await;
    let execution_id = body["executionId"].as_str().unwrap().to_string();
    let handle = ExecutionHandle::new(execution_id.as_str());

    let (status, body) = send_json(
        router(&h),
        "GET",
        &format!("/api/athena/export/{execution_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "EXPORT_LOCATION_UNRESOLVED");

    h.execution
        .set_state(&handle, LifecycleState::Succeeded, None);

    // Succeeded, but the object is missing from the store.
    let (status, body) = send_json(
        router(&h),
        "GET",
        &format!("/api/athena/export/{execution_id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "EXPORT_FETCH_FAILED");

    let csv = "\"_col0\"\n\"1\"\n";
    let location = format!("{OUTPUT_LOCATION}{execution_id}.csv");
    h.objects.put(S3Location::parse(&location).unwrap(), csv);

    let response = router(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/api/athena/export/{execution_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/csv"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=query_results.csv"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], csv.as_bytes());
}

#[tokio::test]
async fn test_submission_failure_is_bad_gateway() {
    let h = Harness::new().await;
    h.execution.reject_submissions("Access denied to workgroup");

    let (status, body) = send_json(
        router(&h),
        "POST",
        "/api/athena/execute",
        Some(json!({"sql": "SELECT 1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "SUBMISSION_FAILED");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Access denied"));
}

#[tokio::test]
async fn test_client_against_live_server() {
    let h = Harness::new().await;
    let app = router(&h);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ZeusClient::new(format!("http://{addr}")).unwrap();
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "zeus");

    let executed = client
        .execute(&ExecuteRequest {
            sql: Some("SELECT 'a' AS letter".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let handle = ExecutionHandle::new(executed.execution_id.as_str());

    h.execution.set_results(&handle, &["letter"], vec![row(&["a"])]);
    h.execution
        .set_state(&handle, LifecycleState::Succeeded, None);

    let page = client
        .results(&handle, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.status, LifecycleState::Succeeded);
    assert_eq!(page.rows, vec![vec!["a"]]);

    let location = format!("{OUTPUT_LOCATION}{handle}.csv");
    h.objects
        .put(S3Location::parse(&location).unwrap(), "letter\na\n");
    let chunks: Vec<_> = client
        .export(&handle)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(chunks.concat(), b"letter\na\n");

    let err = client
        .results(&ExecutionHandle::new("exec-9999"), PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ZeusError::Reconcile(_)));

    server.abort();
}

#[tokio::test]
async fn test_execute_definition_rejects_malformed_body() {
    let h = Harness::new().await;
    let (_, created) = send_json(
        router(&h),
        "POST",
        "/api/queries",
        Some(json!({"name": "one", "sql": "SELECT 1"})),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        router(&h),
        "POST",
        &format!("/api/queries/{id}/runs"),
        Some(json!({"sql": 123, "parameters": "not-a-map"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(h.execution.start_calls(), 0);

    let (status, runs) =
        send_json(router(&h), "GET", &format!("/api/queries/{id}/runs"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(runs.as_array().unwrap().is_empty());

    // No body at all runs the stored SQL.
    let (status, run) =
        send_json(router(&h), "POST", &format!("/api/queries/{id}/runs"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(run["sql"], "SELECT 1");
    assert_eq!(h.execution.start_calls(), 1);
}
