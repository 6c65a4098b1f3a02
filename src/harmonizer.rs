//! Plan and apply use cases.
//!
//! ```text
//! plan:  branch head → ManifestCollector → reconcile
//! apply: plan → harmonize → commit plan → RemoteCommitPipeline
//! ```
//!
//! Nothing is cached between calls. Every apply collects and reconciles
//! again from the live base branch, so its decisions can differ from an
//! earlier plan if the repository moved in between; compare
//! `summary.fingerprint` to detect that.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::info;

use crate::collector::{CollectError, ManifestCollector};
use crate::harmonize::{commit_plan, harmonize};
use crate::pipeline::{next_branch_name, CommitRequest, PipelineError, RemoteCommitPipeline};
use crate::reconcile::reconcile;
use crate::store::RepositoryStore;
use crate::types::{BranchHead, CommitOutcome, CommitPlan, Module, Reconciliation, Suggestion};

/// Title used when the caller supplies no apply message.
pub const DEFAULT_COMMIT_TITLE: &str = "chore: harmonize package scripts and dependencies";

/// Error type for the plan and apply use cases.
#[derive(Debug, thiserror::Error)]
pub enum HarmonizerError {
    /// Resolving the base branch failed.
    #[error("Store error: {0}")]
    StoreError(String),
    /// Listing the base tree failed.
    #[error(transparent)]
    Collect(#[from] CollectError),
    /// Harmonization changes no manifest.
    #[error("Nothing to commit: every manifest is already harmonized")]
    NothingToCommit,
    /// The commit pipeline stopped part way.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result of a plan run.
#[derive(Debug, Clone)]
pub struct HarmonizePlan {
    /// Branch the plan was computed against.
    pub base_branch: String,
    /// Tip of that branch at collection time.
    pub base: BranchHead,
    /// Collected modules in collection order.
    pub modules: Vec<Module>,
    /// Decision set.
    pub reconciliation: Reconciliation,
}

/// Result of an apply run.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The plan that was committed.
    pub plan: HarmonizePlan,
    /// Files written in the commit.
    pub files: Vec<String>,
    /// Branch, commit and pull request.
    pub commit: CommitOutcome,
}

/// Plan and apply entry point over a repository store.
pub struct Harmonizer<R: RepositoryStore> {
    store: Arc<R>,
    module_paths: Vec<String>,
    base_branch: Option<String>,
}

impl<R: RepositoryStore + 'static> Harmonizer<R> {
    /// Create a harmonizer.
    ///
    /// `module_paths` are used when a request names no prefixes.
    /// `base_branch` overrides the repository's default branch.
    pub fn new(store: Arc<R>, module_paths: Vec<String>, base_branch: Option<String>) -> Self {
        Self {
            store,
            module_paths,
            base_branch,
        }
    }

    /// Requested prefixes, normalized, or the defaults when none remain.
    pub fn resolve_paths(&self, requested: &[String]) -> Vec<String> {
        let paths: Vec<String> = requested
            .iter()
            .map(|p| p.trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if paths.is_empty() {
            self.module_paths.clone()
        } else {
            paths
        }
    }

    async fn base_branch(&self) -> Result<String, HarmonizerError> {
        match &self.base_branch {
            Some(branch) => Ok(branch.clone()),
            None => self
                .store
                .default_branch()
                .await
                .map_err(|e| HarmonizerError::StoreError(e.to_string())),
        }
    }

    /// Collect and reconcile. Performs no remote writes.
    pub async fn plan(&self, requested_paths: &[String]) -> Result<HarmonizePlan, HarmonizerError> {
        let paths = self.resolve_paths(requested_paths);
        let base_branch = self.base_branch().await?;
        let base = self
            .store
            .branch_head(&base_branch)
            .await
            .map_err(|e| HarmonizerError::StoreError(e.to_string()))?;

        let modules = ManifestCollector::new(Arc::clone(&self.store))
            .collect(&base, &paths)
            .await?;
        let reconciliation = reconcile(&modules);

        info!(
            base_branch = %base_branch,
            module_count = modules.len(),
            script_decisions = reconciliation.summary.script_decisions,
            dependency_decisions = reconciliation.summary.dependency_decisions,
            fingerprint = %reconciliation.summary.fingerprint,
            "Harmonization planned"
        );

        Ok(HarmonizePlan {
            base_branch,
            base,
            modules,
            reconciliation,
        })
    }

    /// Plan, harmonize and commit the changed manifests as a pull request.
    pub async fn apply(
        &self,
        requested_paths: &[String],
        message: Option<&str>,
    ) -> Result<ApplyOutcome, HarmonizerError> {
        let plan = self.plan(requested_paths).await?;
        let harmonized = harmonize(
            &plan.modules,
            &plan.reconciliation.script_suggestions,
            &plan.reconciliation.dependency_suggestions,
        );
        let files = commit_plan(&harmonized);
        if files.is_empty() {
            return Err(HarmonizerError::NothingToCommit);
        }

        let title = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_COMMIT_TITLE)
            .to_string();
        let body = pull_request_body(&plan.reconciliation, &files);
        let paths: Vec<String> = files.files().iter().map(|f| f.path.clone()).collect();

        let commit = RemoteCommitPipeline::new(Arc::clone(&self.store))
            .commit(CommitRequest {
                base_branch: plan.base_branch.clone(),
                base: plan.base.clone(),
                branch_name: next_branch_name(),
                plan: files,
                title,
                body,
            })
            .await?;

        info!(
            branch = %commit.branch_name,
            pr_number = commit.pr_number,
            files = paths.len(),
            "Harmonization applied"
        );

        Ok(ApplyOutcome {
            plan,
            files: paths,
            commit,
        })
    }
}

/// Markdown pull request body listing every decision and changed file.
pub fn pull_request_body(reconciliation: &Reconciliation, files: &CommitPlan) -> String {
    let summary = &reconciliation.summary;
    let mut body = String::new();
    let _ = writeln!(
        body,
        "Harmonizes {} modules: {} script and {} dependency decisions.",
        summary.module_count, summary.script_decisions, summary.dependency_decisions
    );

    write_decisions(&mut body, "Scripts", reconciliation.script_decisions());
    write_decisions(&mut body, "Dependencies", reconciliation.dependency_decisions());

    let _ = writeln!(body, "\n### Files\n");
    for file in files.files() {
        let _ = writeln!(body, "- `{}`", file.path);
    }
    let _ = writeln!(body, "\nDecision fingerprint: `{}`", summary.fingerprint);
    body
}

fn write_decisions<'a>(body: &mut String, heading: &str, decisions: impl Iterator<Item = &'a Suggestion>) {
    let mut decisions = decisions.peekable();
    if decisions.peek().is_none() {
        return;
    }
    let _ = writeln!(body, "\n### {}\n", heading);
    for suggestion in decisions {
        let mut line = format!("- `{}` → `{}`", suggestion.key(), suggestion.target_value());
        if let Suggestion::Decision { variant_counts, .. } = suggestion {
            let variants: Vec<String> = variant_counts
                .iter()
                .map(|(value, count)| format!("`{}` x{}", value, count))
                .collect();
            let _ = write!(line, " (was {})", variants.join(", "));
        }
        let _ = writeln!(body, "{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CommitPhase;
    use crate::store::{InMemoryRepository, RemoteCall};

    fn repo() -> Arc<InMemoryRepository> {
        Arc::new(InMemoryRepository::with_files([
            (
                "apps/a/package.json",
                r#"{"name":"a","scripts":{"build":"tsc"},"dependencies":{"react":"^17.0.0"}}"#,
            ),
            (
                "apps/b/package.json",
                r#"{"name":"b","scripts":{"build":"vite build"},"dependencies":{"react":"^18.2.0"}}"#,
            ),
            ("packages/ui/package.json", r#"{"name":"ui","scripts":{"lint":"eslint ."}}"#),
        ]))
    }

    fn harmonizer(store: &Arc<InMemoryRepository>) -> Harmonizer<InMemoryRepository> {
        Harmonizer::new(
            Arc::clone(store),
            vec!["apps".to_string(), "packages".to_string()],
            None,
        )
    }

    #[test]
    fn test_resolve_paths() {
        let h = harmonizer(&repo());
        assert_eq!(h.resolve_paths(&[]), vec!["apps", "packages"]);
        assert_eq!(h.resolve_paths(&[" /apps/ ".to_string(), "".to_string()]), vec!["apps"]);
        assert_eq!(h.resolve_paths(&["/".to_string()]), vec!["apps", "packages"]);
    }

    #[tokio::test]
    async fn test_plan_makes_no_writes() {
        let store = repo();
        let plan = harmonizer(&store).plan(&[]).await.unwrap();
        assert_eq!(plan.base_branch, "main");
        assert_eq!(plan.modules.len(), 3);
        assert_eq!(plan.reconciliation.summary.script_decisions, 1);
        assert_eq!(plan.reconciliation.summary.dependency_decisions, 1);
        assert!(store
            .calls()
            .iter()
            .all(|c| matches!(c, RemoteCall::DefaultBranch | RemoteCall::BranchHead | RemoteCall::ListTree | RemoteCall::ReadFile)));
    }

    #[tokio::test]
    async fn test_plan_restricted_to_prefix() {
        let store = repo();
        let plan = harmonizer(&store).plan(&["packages".to_string()]).await.unwrap();
        assert_eq!(plan.modules.len(), 1);
        assert_eq!(plan.reconciliation.summary.script_decisions, 0);
    }

    #[tokio::test]
    async fn test_base_branch_override_skips_lookup() {
        let store = repo();
        let h = Harmonizer::new(Arc::clone(&store), vec!["apps".to_string()], Some("main".to_string()));
        h.plan(&[]).await.unwrap();
        assert!(!store.calls().contains(&RemoteCall::DefaultBranch));
    }

    #[tokio::test]
    async fn test_apply_commits_changed_manifests() {
        let store = repo();
        let outcome = harmonizer(&store).apply(&[], None).await.unwrap();

        assert_eq!(outcome.files, vec!["apps/a/package.json", "apps/b/package.json", "packages/ui/package.json"]);
        let a = store.file_at(&outcome.commit.branch_name, "apps/a/package.json").unwrap();
        assert!(a.contains("\"react\": \"^18.2.0\""));
        let ui = store.file_at(&outcome.commit.branch_name, "packages/ui/package.json").unwrap();
        assert!(ui.contains("\"build\": \"tsc\""));
        assert!(!ui.contains("react"));

        let pulls = store.pull_requests();
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].title, DEFAULT_COMMIT_TITLE);
        assert!(pulls[0].body.contains("`react` → `^18.2.0`"));
    }

    #[tokio::test]
    async fn test_apply_message_overrides_title() {
        let store = repo();
        harmonizer(&store).apply(&[], Some("sync manifests")).await.unwrap();
        assert_eq!(store.pull_requests()[0].title, "sync manifests");
    }

    #[tokio::test]
    async fn test_nothing_to_commit_writes_nothing() {
        let store = Arc::new(InMemoryRepository::with_files([
            ("apps/a/package.json", r#"{"scripts":{"build":"tsc"}}"#),
            ("apps/b/package.json", r#"{"scripts":{"build":"tsc"}}"#),
        ]));
        let result = harmonizer(&store).apply(&[], None).await;
        assert!(matches!(result, Err(HarmonizerError::NothingToCommit)));
        assert_eq!(store.branches(), vec!["main".to_string()]);
    }

    #[tokio::test]
    async fn test_pipeline_failure_surfaces_phase() {
        let store = repo();
        store.fail_on(RemoteCall::CreateTree);
        let error = harmonizer(&store).apply(&[], None).await.unwrap_err();
        match error {
            HarmonizerError::Pipeline(e) => {
                assert_eq!(e.phase, CommitPhase::CreateTree);
                assert_eq!(e.residue.blobs.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.pull_requests().is_empty());
    }
}
