//! Remote repository objects and commit plans.

use serde::{Deserialize, Serialize};

/// File mode for regular blobs.
pub const BLOB_MODE: &str = "100644";

/// Tip of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchHead {
    /// Commit the branch points at.
    pub commit_sha: String,
    /// Root tree of that commit.
    pub tree_sha: String,
}

/// Kind of object listed in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    /// File.
    Blob,
    /// Directory.
    Tree,
    /// Submodule.
    Commit,
}

/// Entry of a recursively listed tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Repository-relative path.
    pub path: String,
    /// Object kind.
    pub kind: TreeEntryKind,
    /// Object id.
    pub sha: String,
}

/// Entry written into a new tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTreeEntry {
    /// Repository-relative path.
    pub path: String,
    /// Always [`BLOB_MODE`] for harmonized files.
    pub mode: String,
    /// Object type, `blob`.
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    /// Uploaded blob id.
    pub sha: String,
}

impl NewTreeEntry {
    /// Regular file entry for an uploaded blob.
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE.to_string(),
            kind: TreeEntryKind::Blob,
            sha: sha.into(),
        }
    }
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
    /// Title.
    pub title: String,
    /// Markdown body.
    pub body: String,
}

/// Opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Provider-assigned number.
    pub number: u64,
    /// Browser URL.
    pub url: String,
}

/// One file destined for the new commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFile {
    /// Repository-relative path.
    pub path: String,
    /// Full new content.
    pub content: String,
}

/// Ordered list of files for a single commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPlan {
    files: Vec<CommitFile>,
}

impl CommitPlan {
    /// Empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file. A later push for the same path replaces the earlier one
    /// in place.
    pub fn push(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        match self.files.iter_mut().find(|f| f.path == path) {
            Some(existing) => existing.content = content,
            None => self.files.push(CommitFile { path, content }),
        }
    }

    /// Files in insertion order.
    pub fn files(&self) -> &[CommitFile] {
        &self.files
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// What a successful pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    /// Branch created for the change.
    pub branch_name: String,
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request URL.
    pub pr_url: String,
    /// New commit.
    pub commit_sha: String,
}
