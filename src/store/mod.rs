//! Remote repository backends.

pub mod memory;

#[cfg(feature = "remote")]
pub mod github;

use async_trait::async_trait;
use crate::types::{BranchHead, NewPullRequest, NewTreeEntry, PullRequest, TreeEntry};

/// Trait for the version-control provider.
///
/// Each method is one remote round trip. Write methods are individually
/// durable but the trait offers no way to group them: a sequence of calls
/// can stop half-way and leave earlier objects behind.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Name of the repository's default branch.
    async fn default_branch(&self) -> Result<String, Self::Error>;

    /// Resolve a branch to its tip commit and root tree.
    async fn branch_head(&self, branch: &str) -> Result<BranchHead, Self::Error>;

    /// List a tree recursively.
    async fn list_tree(&self, tree_sha: &str) -> Result<Vec<TreeEntry>, Self::Error>;

    /// Read a file at a ref. `None` when the path does not exist there.
    async fn read_file(&self, path: &str, reference: &str) -> Result<Option<String>, Self::Error>;

    /// Create `refs/heads/{branch}` pointing at `sha`.
    async fn create_ref(&self, branch: &str, sha: &str) -> Result<(), Self::Error>;

    /// Upload file content, returning the blob id.
    async fn create_blob(&self, content: &str) -> Result<String, Self::Error>;

    /// Create a tree layered over `base_tree`, returning its id.
    async fn create_tree(&self, base_tree: &str, entries: &[NewTreeEntry]) -> Result<String, Self::Error>;

    /// Create a commit object, returning its id.
    async fn create_commit(&self, message: &str, tree_sha: &str, parents: &[String]) -> Result<String, Self::Error>;

    /// Move `refs/heads/{branch}` to `sha`.
    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<(), Self::Error>;

    /// Open a pull request.
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest, Self::Error>;
}

pub use memory::{InMemoryRepository, InMemoryError, RemoteCall};

#[cfg(feature = "remote")]
pub use github::{GitHubRepository, GitHubError};
