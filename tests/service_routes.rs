//! Router tests for the harmonizer service.

#![cfg(feature = "service")]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use monorepo_harmonizer::service::{create_router, request_logging_middleware, ServiceState};
use monorepo_harmonizer::store::{InMemoryRepository, RemoteCall};
use monorepo_harmonizer::types::VersionExcerpt;
use monorepo_harmonizer::{Unification, Unifier, UnifyError};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct FirstVersionUnifier;

#[async_trait]
impl Unifier for FirstVersionUnifier {
    async fn unify(&self, _path: &str, versions: &[VersionExcerpt]) -> Result<Unification, UnifyError> {
        Ok(Unification {
            merged_text: versions[0].content.clone(),
            rationale: format!("took {}", versions[0].component),
        })
    }
}

fn repository() -> InMemoryRepository {
    InMemoryRepository::with_files([
        (
            "apps/a/package.json",
            r#"{"name":"a","scripts":{"build":"tsc"},"dependencies":{"react":"^17.0.0"}}"#,
        ),
        (
            "apps/b/package.json",
            r#"{"name":"b","scripts":{"build":"vite build"},"dependencies":{"react":"^18.2.0"}}"#,
        ),
    ])
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in [
        ("apps/web/src/format.ts", "export const a = 1;\n"),
        ("apps/admin/src/format.ts", "export const a = 2;\n"),
    ] {
        let path = dir.path().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

fn state(store: InMemoryRepository, root: &TempDir) -> ServiceState<InMemoryRepository> {
    ServiceState::new(store, vec!["apps".to_string()], root.path())
}

async fn call(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Routes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let root = workspace();
    let (status, body) = call(create_router(state(repository(), &root)), "GET", "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
}

#[tokio::test]
async fn test_plan_returns_decisions() {
    let root = workspace();
    let (status, body) = call(create_router(state(repository(), &root)), "POST", "/harmonize/plan", "{}").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["summary"]["moduleCount"], json!(2));
    assert_eq!(body["modules"][0]["name"], json!("a"));
    assert_eq!(body["modules"][0]["kind"], json!("app"));

    let build = &body["suggestions"]["scripts"][0];
    assert_eq!(build["type"], json!("decision"));
    assert_eq!(build["recommendedValue"], json!("tsc"));
    assert_eq!(build["variantCounts"], json!({"tsc": 1, "vite build": 1}));
    assert_eq!(body["suggestions"]["dependencies"][0]["recommendedValue"], json!("^18.2.0"));
}

#[tokio::test]
async fn test_malformed_body_reads_as_empty() {
    let root = workspace();
    let (status, body) = call(
        create_router(state(repository(), &root)),
        "POST",
        "/harmonize/plan",
        "{definitely not json",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["moduleCount"], json!(2));
}

#[tokio::test]
async fn test_apply_opens_pull_request() {
    let root = workspace();
    let store = repository();
    let app = create_router(state(store, &root));
    let (status, body) = call(app, "POST", "/harmonize/apply", r#"{"applyMessage":"chore: sync"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["branch"].as_str().unwrap().starts_with("harmonize/"));
    assert_eq!(body["pr"]["prNumber"], json!(1));
    assert_eq!(body["pr"]["prUrl"], json!("memory://pulls/1"));
    assert_eq!(body["files"], json!(["apps/a/package.json", "apps/b/package.json"]));
}

#[tokio::test]
async fn test_pipeline_failure_is_500_with_phase() {
    let root = workspace();
    let store = repository();
    store.fail_on(RemoteCall::UpdateRef);
    let (status, body) = call(create_router(state(store, &root)), "POST", "/harmonize/apply", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["phase"], json!("updateRef"));
    assert!(body["residue"]["branch"].is_string());
    assert!(body["error"].as_str().unwrap().contains("update_ref"));
}

#[tokio::test]
async fn test_nothing_to_commit_is_500() {
    let root = workspace();
    let store = InMemoryRepository::with_files([("apps/a/package.json", r#"{"scripts":{"build":"tsc"}}"#)]);
    let (status, body) = call(create_router(state(store, &root)), "POST", "/harmonize/apply", "{}").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Nothing to commit"));
}

#[tokio::test]
async fn test_preview_placeholders_and_alias() {
    let root = workspace();
    let request = r#"{"components":[{"name":"web","path":"apps/web"},{"name":"admin","path":"apps/admin"}]}"#;
    for uri in ["/api/code-harmonizer/preview", "/harmonize/preview"] {
        let (status, body) = call(create_router(state(repository(), &root)), "POST", uri, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["diffs"][0]["relativePath"], json!("src/format.ts"));
        assert_eq!(body["result"]["diffs"][0]["identical"], json!(false));
        assert_eq!(body["result"]["suggestions"][0]["mergedText"], json!(""));
    }
}

#[tokio::test]
async fn test_preview_with_unifier() {
    let root = workspace();
    let app = create_router(state(repository(), &root).with_unifier(Arc::new(FirstVersionUnifier)));
    let request = r#"{"components":[{"name":"web","path":"apps/web"},{"name":"admin","path":"apps/admin"}]}"#;
    let (_, body) = call(app, "POST", "/api/code-harmonizer/preview", request).await;
    assert_eq!(body["result"]["suggestions"][0]["mergedText"], json!("export const a = 1;\n"));
    assert_eq!(body["result"]["suggestions"][0]["rationale"], json!("took web"));
}

#[tokio::test]
async fn test_code_apply_writes_into_target() {
    let root = workspace();
    let request = json!({
        "suggestions": [
            {"relativePath": "src/format.ts", "mergedText": "export const a = 3;\n", "rationale": "merged"},
            {"relativePath": "src/other.ts", "mergedText": "", "rationale": "manual"}
        ],
        "targetComponent": "apps/admin"
    });
    let (status, body) = call(
        create_router(state(repository(), &root)),
        "POST",
        "/api/code-harmonizer/apply",
        &request.to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!(1));
    assert_eq!(
        std::fs::read_to_string(root.path().join("apps/admin/src/format.ts")).unwrap(),
        "export const a = 3;\n"
    );
    assert!(!root.path().join("apps/admin/src/other.ts").exists());
}

#[tokio::test]
async fn test_code_apply_rejects_traversal() {
    let root = workspace();
    let request = json!({
        "suggestions": [{"relativePath": "../../escape.ts", "mergedText": "x", "rationale": ""}],
        "targetComponent": {"name": "admin", "path": "apps/admin"}
    });
    let (status, body) = call(
        create_router(state(repository(), &root)),
        "POST",
        "/api/code-harmonizer/apply",
        &request.to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], json!(false));
    assert!(!root.path().join("escape.ts").exists());
}

#[tokio::test]
async fn test_code_apply_requires_target() {
    let root = workspace();
    let (status, body) = call(
        create_router(state(repository(), &root)),
        "POST",
        "/api/code-harmonizer/apply",
        r#"{"suggestions":[]}"#,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("targetComponent"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let root = workspace();
    let app = create_router(state(repository(), &root))
        .layer(axum::middleware::from_fn(request_logging_middleware));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn test_apply_keeps_paths_beside_bad_field() {
    let root = workspace();
    let state = state(repository(), &root);
    let store = Arc::clone(&state.store);
    let (status, body) = call(
        create_router(state),
        "POST",
        "/harmonize/apply",
        r#"{"paths":["apps/a"],"applyMessage":42}"#,
    )
    .await;
    // Only apps/a is in scope, so there is nothing to reconcile against.
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Nothing to commit"));
    assert!(store.pull_requests().is_empty());
}
