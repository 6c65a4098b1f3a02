//! Remote commit pipeline.
//!
//! Turns a [`CommitPlan`] into a branch, a commit and a pull request through
//! six sequential remote calls:
//!
//! ```text
//! CreateBranch → CreateBlobs → CreateTree → CreateCommit → UpdateRef → OpenPullRequest → Done
//! ```
//!
//! The provider offers no transaction around these calls and the pipeline
//! does not roll anything back. Once `CreateBranch` has succeeded, any later
//! failure leaves the branch (and possibly blobs, a tree or a dangling
//! commit) behind. [`PipelineError`] reports exactly which phase failed and
//! what [`RemoteResidue`] exists, so callers can treat a failed apply as
//! possibly partially applied and check the remote before retrying.
//!
//! The branch keeps pointing at the base commit until `UpdateRef` succeeds,
//! and no pull request exists unless the run reaches `Done`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::RepositoryStore;
use crate::types::{BranchHead, CommitOutcome, CommitPlan, NewPullRequest, NewTreeEntry};

/// Prefix of every branch the pipeline creates.
pub const BRANCH_PREFIX: &str = "harmonize/";

static LAST_BRANCH_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Branch name embedding a UTC timestamp with millisecond precision.
///
/// Timestamps are forced to be strictly increasing within the process, so two
/// runs in the same process never share a name. Separate processes can still
/// collide; the remote rejects the duplicate ref and the run fails at
/// `CreateBranch`.
pub fn next_branch_name() -> String {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_BRANCH_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or(now);
    let millis = now.max(previous + 1);
    branch_name_at(DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now))
}

/// Branch name for a given instant.
pub fn branch_name_at(at: DateTime<Utc>) -> String {
    format!("{}{}", BRANCH_PREFIX, at.format("%Y%m%d-%H%M%S-%3f"))
}

/// Phases of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitPhase {
    /// Create the branch ref at the base commit.
    CreateBranch,
    /// Upload one blob per file.
    CreateBlobs,
    /// Create a tree over the base tree.
    CreateTree,
    /// Create the commit with the base tip as parent.
    CreateCommit,
    /// Move the branch to the new commit.
    UpdateRef,
    /// Open the pull request.
    OpenPullRequest,
    /// Finished.
    Done,
}

impl CommitPhase {
    /// Phase that follows this one.
    pub fn next(self) -> Self {
        match self {
            Self::CreateBranch => Self::CreateBlobs,
            Self::CreateBlobs => Self::CreateTree,
            Self::CreateTree => Self::CreateCommit,
            Self::CreateCommit => Self::UpdateRef,
            Self::UpdateRef => Self::OpenPullRequest,
            Self::OpenPullRequest | Self::Done => Self::Done,
        }
    }

    /// Whether a failure in this phase can leave objects on the remote.
    pub fn may_leave_residue(self) -> bool {
        !matches!(self, Self::CreateBranch | Self::Done)
    }
}

impl std::fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CreateBranch => "create_branch",
            Self::CreateBlobs => "create_blobs",
            Self::CreateTree => "create_tree",
            Self::CreateCommit => "create_commit",
            Self::UpdateRef => "update_ref",
            Self::OpenPullRequest => "open_pull_request",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Remote objects created so far by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResidue {
    /// Branch created in `CreateBranch`.
    pub branch: Option<String>,
    /// Blobs uploaded in `CreateBlobs`.
    pub blobs: Vec<String>,
    /// Tree created in `CreateTree`.
    pub tree: Option<String>,
    /// Commit created in `CreateCommit`.
    pub commit: Option<String>,
    /// Whether the branch was moved off the base commit.
    pub ref_updated: bool,
}

impl RemoteResidue {
    /// True when nothing was written remotely.
    pub fn is_empty(&self) -> bool {
        self.branch.is_none() && self.blobs.is_empty() && self.tree.is_none() && self.commit.is_none()
    }
}

/// A pipeline run stopped at `phase`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Commit pipeline failed at {phase}: {message}")]
pub struct PipelineError {
    /// Phase whose remote call failed.
    pub phase: CommitPhase,
    /// What already exists remotely.
    pub residue: RemoteResidue,
    /// Remote error, verbatim.
    pub message: String,
}

/// Input of one run.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Branch the pull request targets.
    pub base_branch: String,
    /// Tip of the base branch.
    pub base: BranchHead,
    /// Branch to create.
    pub branch_name: String,
    /// Files for the commit.
    pub plan: CommitPlan,
    /// Commit and pull request title.
    pub title: String,
    /// Commit and pull request body.
    pub body: String,
}

/// State of a run between phases.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    request: CommitRequest,
    phase: CommitPhase,
    entries: Vec<NewTreeEntry>,
    residue: RemoteResidue,
    outcome: Option<CommitOutcome>,
}

impl PipelineRun {
    /// Start a run at `CreateBranch`.
    pub fn new(request: CommitRequest) -> Self {
        Self {
            request,
            phase: CommitPhase::CreateBranch,
            entries: Vec::new(),
            residue: RemoteResidue::default(),
            outcome: None,
        }
    }

    /// Phase that will run next.
    pub fn phase(&self) -> CommitPhase {
        self.phase
    }

    /// Remote objects created so far.
    pub fn residue(&self) -> &RemoteResidue {
        &self.residue
    }

    /// Result once the run reached `Done`.
    pub fn outcome(&self) -> Option<&CommitOutcome> {
        self.outcome.as_ref()
    }

    fn fail<E: std::fmt::Display>(&self, error: E) -> PipelineError {
        PipelineError {
            phase: self.phase,
            residue: self.residue.clone(),
            message: error.to_string(),
        }
    }

    fn commit_message(&self) -> String {
        if self.request.body.trim().is_empty() {
            self.request.title.clone()
        } else {
            format!("{}\n\n{}", self.request.title, self.request.body)
        }
    }
}

/// Drives [`PipelineRun`]s against a store.
pub struct RemoteCommitPipeline<S: RepositoryStore> {
    store: Arc<S>,
}

impl<S: RepositoryStore + 'static> RemoteCommitPipeline<S> {
    /// Create a pipeline over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run every phase to completion.
    pub async fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, PipelineError> {
        let mut run = PipelineRun::new(request);
        if run.request.plan.is_empty() {
            return Err(run.fail("commit plan is empty"));
        }

        while run.phase != CommitPhase::Done {
            if let Err(error) = self.advance(&mut run).await {
                warn!(
                    phase = %error.phase,
                    branch = ?error.residue.branch,
                    blobs = error.residue.blobs.len(),
                    error = %error.message,
                    "Commit pipeline stopped; remote objects were left in place"
                );
                return Err(error);
            }
        }

        run.outcome.ok_or_else(|| PipelineError {
            phase: CommitPhase::Done,
            residue: run.residue.clone(),
            message: "pipeline finished without an outcome".to_string(),
        })
    }

    /// Execute the current phase and move to the next one.
    ///
    /// On failure the run stays in the failing phase.
    pub async fn advance(&self, run: &mut PipelineRun) -> Result<(), PipelineError> {
        match run.phase {
            CommitPhase::CreateBranch => {
                self.store
                    .create_ref(&run.request.branch_name, &run.request.base.commit_sha)
                    .await
                    .map_err(|e| run.fail(e))?;
                run.residue.branch = Some(run.request.branch_name.clone());
                info!(branch = %run.request.branch_name, base = %run.request.base.commit_sha, "Branch created");
            }
            CommitPhase::CreateBlobs => {
                for file in run.request.plan.files().to_vec() {
                    let sha = self
                        .store
                        .create_blob(&file.content)
                        .await
                        .map_err(|e| run.fail(format!("{}: {}", file.path, e)))?;
                    run.residue.blobs.push(sha.clone());
                    run.entries.push(NewTreeEntry::blob(file.path, sha));
                }
                info!(blobs = run.entries.len(), "Blobs uploaded");
            }
            CommitPhase::CreateTree => {
                let tree = self
                    .store
                    .create_tree(&run.request.base.tree_sha, &run.entries)
                    .await
                    .map_err(|e| run.fail(e))?;
                run.residue.tree = Some(tree);
            }
            CommitPhase::CreateCommit => {
                let tree = run.residue.tree.clone().unwrap_or_default();
                let message = run.commit_message();
                let commit = self
                    .store
                    .create_commit(&message, &tree, &[run.request.base.commit_sha.clone()])
                    .await
                    .map_err(|e| run.fail(e))?;
                info!(commit = %commit, "Commit created");
                run.residue.commit = Some(commit);
            }
            CommitPhase::UpdateRef => {
                let commit = run.residue.commit.clone().unwrap_or_default();
                self.store
                    .update_ref(&run.request.branch_name, &commit, true)
                    .await
                    .map_err(|e| run.fail(e))?;
                run.residue.ref_updated = true;
            }
            CommitPhase::OpenPullRequest => {
                let pull = self
                    .store
                    .create_pull_request(&NewPullRequest {
                        head: run.request.branch_name.clone(),
                        base: run.request.base_branch.clone(),
                        title: run.request.title.clone(),
                        body: run.request.body.clone(),
                    })
                    .await
                    .map_err(|e| run.fail(e))?;
                info!(pr_number = pull.number, pr_url = %pull.url, "Pull request opened");
                run.outcome = Some(CommitOutcome {
                    branch_name: run.request.branch_name.clone(),
                    pr_number: pull.number,
                    pr_url: pull.url,
                    commit_sha: run.residue.commit.clone().unwrap_or_default(),
                });
            }
            CommitPhase::Done => return Ok(()),
        }
        run.phase = run.phase.next();
        Ok(())
    }
}
