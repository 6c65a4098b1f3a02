//! Axum routes for the harmonizer service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::harmonizer::HarmonizerError;
use crate::pipeline::{CommitPhase, RemoteResidue};
use crate::store::RepositoryStore;
use crate::types::{
    Component, ModuleSummary, ReconciliationSummary, SuggestionSets, UnificationPreview,
    UnificationSuggestion,
};
use crate::unify::{self, WorkspaceError};

use super::middleware::{
    metrics_middleware, record_apply_metrics, record_plan_metrics, record_unify_metrics,
};
use super::state::ServiceState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `/harmonize/plan`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanRequest {
    /// Path prefixes; empty means the configured defaults.
    #[serde(deserialize_with = "lenient_field")]
    pub paths: Option<Vec<String>>,
}

/// Body of `/harmonize/apply`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplyRequest {
    /// Path prefixes; empty means the configured defaults.
    #[serde(deserialize_with = "lenient_field")]
    pub paths: Option<Vec<String>>,
    /// Commit and pull request title override.
    #[serde(deserialize_with = "lenient_field")]
    pub apply_message: Option<String>,
}

/// Body of the preview routes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewRequest {
    /// Components to compare.
    #[serde(deserialize_with = "lenient_field")]
    pub components: Vec<Component>,
}

/// Target of a code apply: a component or a bare path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetComponent {
    /// `{name, path}`
    Component(Component),
    /// Bare path relative to the workspace root.
    Path(String),
}

impl TargetComponent {
    /// Directory relative to the workspace root.
    pub fn path(&self) -> &str {
        match self {
            Self::Component(component) => &component.path,
            Self::Path(path) => path,
        }
    }
}

/// Body of `/api/code-harmonizer/apply`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeApplyRequest {
    /// Suggestions to write; placeholders are skipped.
    #[serde(deserialize_with = "lenient_field")]
    pub suggestions: Vec<UnificationSuggestion>,
    /// Component receiving the files.
    #[serde(deserialize_with = "lenient_field")]
    pub target_component: Option<TargetComponent>,
}

/// Plan response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    /// Always true.
    pub ok: bool,
    /// Branch the plan was computed against.
    pub base_branch: String,
    /// Tally.
    pub summary: ReconciliationSummary,
    /// Script and dependency suggestions.
    pub suggestions: SuggestionSets,
    /// Collected modules.
    pub modules: Vec<ModuleSummary>,
}

/// Pull request coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request URL.
    pub pr_url: String,
    /// Commit on the new branch.
    pub commit_sha: String,
}

/// Apply response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    /// Always true.
    pub ok: bool,
    /// New branch.
    pub branch: String,
    /// Tally.
    pub summary: ReconciliationSummary,
    /// Script and dependency suggestions.
    pub suggestions: SuggestionSets,
    /// Collected modules.
    pub modules: Vec<ModuleSummary>,
    /// Manifests written in the commit.
    pub files: Vec<String>,
    /// Pull request.
    pub pr: PullRequestInfo,
}

/// Preview response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    /// Always true.
    pub ok: bool,
    /// Groups and suggestions.
    pub result: UnificationPreview,
}

/// Code apply response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeApplyResponse {
    /// Always true.
    pub ok: bool,
    /// Files written.
    pub applied: usize,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always true.
    pub ok: bool,
    /// Crate version.
    pub version: String,
}

/// Error body, always sent with status 500.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false.
    pub ok: bool,
    /// Error message.
    pub error: String,
    /// Pipeline phase that failed, for a partially applied commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<CommitPhase>,
    /// Remote objects left behind by a failed pipeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residue: Option<RemoteResidue>,
}

impl ErrorResponse {
    /// Error with a message only.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            phase: None,
            residue: None,
        }
    }
}

impl From<HarmonizerError> for ErrorResponse {
    fn from(error: HarmonizerError) -> Self {
        match error {
            HarmonizerError::Pipeline(e) => Self {
                ok: false,
                error: e.to_string(),
                phase: Some(e.phase),
                residue: Some(e.residue),
            },
            other => Self::new(other.to_string()),
        }
    }
}

impl From<WorkspaceError> for ErrorResponse {
    fn from(error: WorkspaceError) -> Self {
        Self::new(error.to_string())
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.error, phase = ?self.phase, "Request error");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

/// Read one body field; a value of the wrong shape reads as that field's default.
fn lenient_field<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Request field did not match, using default");
        T::default()
    }))
}

/// Parse a body leniently: anything unparseable reads as the default.
fn lenient<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Request body did not match, using defaults");
            T::default()
        }),
        _ => T::default(),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: crate::VERSION.to_string(),
    })
}

/// Collect and reconcile without writing.
async fn plan_handler<R: RepositoryStore + 'static>(
    State(state): State<Arc<ServiceState<R>>>,
    body: Bytes,
) -> Result<Json<PlanResponse>, ErrorResponse> {
    let request: PlanRequest = lenient(&body);
    let start = Instant::now();

    let plan = state
        .harmonizer()
        .plan(&request.paths.unwrap_or_default())
        .await?;

    let summary = plan.reconciliation.summary.clone();
    record_plan_metrics(
        summary.module_count,
        summary.script_decisions + summary.dependency_decisions,
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(PlanResponse {
        ok: true,
        base_branch: plan.base_branch.clone(),
        suggestions: plan.reconciliation.suggestion_sets(),
        modules: plan.modules.iter().map(|m| m.summary()).collect(),
        summary,
    }))
}

/// Harmonize and open a pull request.
async fn apply_handler<R: RepositoryStore + 'static>(
    State(state): State<Arc<ServiceState<R>>>,
    body: Bytes,
) -> Result<Json<ApplyResponse>, ErrorResponse> {
    let request: ApplyRequest = lenient(&body);
    let start = Instant::now();

    let result = state
        .harmonizer()
        .apply(
            &request.paths.unwrap_or_default(),
            request.apply_message.as_deref(),
        )
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let phase = match &e {
                HarmonizerError::Pipeline(p) => p.phase.to_string(),
                HarmonizerError::NothingToCommit => "nothing_to_commit".to_string(),
                _ => "plan".to_string(),
            };
            record_apply_metrics(0, Some(&phase), start.elapsed().as_millis() as u64);
            return Err(e.into());
        }
    };
    record_apply_metrics(outcome.files.len(), None, start.elapsed().as_millis() as u64);

    let reconciliation = &outcome.plan.reconciliation;
    Ok(Json(ApplyResponse {
        ok: true,
        branch: outcome.commit.branch_name.clone(),
        summary: reconciliation.summary.clone(),
        suggestions: reconciliation.suggestion_sets(),
        modules: outcome.plan.modules.iter().map(|m| m.summary()).collect(),
        files: outcome.files.clone(),
        pr: PullRequestInfo {
            pr_number: outcome.commit.pr_number,
            pr_url: outcome.commit.pr_url.clone(),
            commit_sha: outcome.commit.commit_sha.clone(),
        },
    }))
}

/// Group shared files and ask for unifications.
async fn preview_handler<R: RepositoryStore + 'static>(
    State(state): State<Arc<ServiceState<R>>>,
    body: Bytes,
) -> Result<Json<PreviewResponse>, ErrorResponse> {
    let request: PreviewRequest = lenient(&body);
    let start = Instant::now();

    let root = state.workspace_root.clone();
    let components = request.components;
    let diffs = tokio::task::spawn_blocking(move || unify::collect_diffs(&root, &components))
        .await
        .map_err(|e| ErrorResponse::new(format!("Workspace scan aborted: {}", e)))??;

    let suggestions = unify::build_suggestions(&diffs, state.unifier.as_deref()).await;

    record_unify_metrics(
        diffs.len(),
        suggestions.iter().filter(|s| !s.is_applicable()).count(),
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(PreviewResponse {
        ok: true,
        result: UnificationPreview { diffs, suggestions },
    }))
}

/// Write accepted unifications into a local component.
async fn code_apply_handler<R: RepositoryStore + 'static>(
    State(state): State<Arc<ServiceState<R>>>,
    body: Bytes,
) -> Result<Json<CodeApplyResponse>, ErrorResponse> {
    let request: CodeApplyRequest = lenient(&body);
    let target = request
        .target_component
        .ok_or_else(|| ErrorResponse::new("targetComponent is required"))?;

    let root = state.workspace_root.clone();
    let suggestions = request.suggestions;
    let applied = tokio::task::spawn_blocking(move || {
        unify::apply_suggestions(&root, target.path(), &suggestions)
    })
    .await
    .map_err(|e| ErrorResponse::new(format!("Workspace write aborted: {}", e)))??;

    Ok(Json(CodeApplyResponse { ok: true, applied }))
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the harmonizer service.
pub fn create_router<R: RepositoryStore + 'static>(state: ServiceState<R>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_handler))
        // Manifest harmonization
        .route("/harmonize/plan", post(plan_handler::<R>))
        .route("/harmonize/apply", post(apply_handler::<R>))
        // File unification
        .route("/api/code-harmonizer/preview", post(preview_handler::<R>))
        .route("/harmonize/preview", post(preview_handler::<R>))
        .route("/api/code-harmonizer/apply", post(code_apply_handler::<R>))
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
}
