//! In-memory repository for testing.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::types::{
    BranchHead, NewPullRequest, NewTreeEntry, PullRequest, TreeEntry, TreeEntryKind,
};
use super::RepositoryStore;

/// Remote calls, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteCall {
    /// `default_branch`
    DefaultBranch,
    /// `branch_head`
    BranchHead,
    /// `list_tree`
    ListTree,
    /// `read_file`
    ReadFile,
    /// `create_ref`
    CreateRef,
    /// `create_blob`
    CreateBlob,
    /// `create_tree`
    CreateTree,
    /// `create_commit`
    CreateCommit,
    /// `update_ref`
    UpdateRef,
    /// `create_pull_request`
    CreatePullRequest,
}

impl std::fmt::Display for RemoteCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DefaultBranch => "default_branch",
            Self::BranchHead => "branch_head",
            Self::ListTree => "list_tree",
            Self::ReadFile => "read_file",
            Self::CreateRef => "create_ref",
            Self::CreateBlob => "create_blob",
            Self::CreateTree => "create_tree",
            Self::CreateCommit => "create_commit",
            Self::UpdateRef => "update_ref",
            Self::CreatePullRequest => "create_pull_request",
        };
        f.write_str(name)
    }
}

/// Error type for the in-memory repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    /// Branch does not exist.
    #[error("Branch not found: {0}")]
    BranchNotFound(String),
    /// Branch already exists.
    #[error("Reference already exists: refs/heads/{0}")]
    RefExists(String),
    /// Object id unknown.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    /// Non-forced ref update that is not a fast-forward.
    #[error("Update is not a fast forward: refs/heads/{0}")]
    NotFastForward(String),
    /// A failure was scripted for this call.
    #[error("Injected failure in {0}")]
    Injected(RemoteCall),
    /// A read of this path was scripted to fail.
    #[error("Read failed: {0}")]
    ReadFailed(String),
}

#[derive(Debug, Clone)]
struct CommitObject {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Default)]
struct RemoteState {
    default_branch: String,
    blobs: BTreeMap<String, String>,
    /// Flat path -> blob id.
    trees: BTreeMap<String, BTreeMap<String, String>>,
    commits: BTreeMap<String, CommitObject>,
    refs: BTreeMap<String, String>,
    pulls: Vec<NewPullRequest>,
    calls: Vec<RemoteCall>,
    fail_on: Option<RemoteCall>,
    failing_reads: BTreeSet<String>,
}

impl RemoteState {
    fn record(&mut self, call: RemoteCall) -> Result<(), InMemoryError> {
        self.calls.push(call);
        if self.fail_on == Some(call) {
            self.fail_on = None;
            return Err(InMemoryError::Injected(call));
        }
        Ok(())
    }

    fn put_blob(&mut self, content: &str) -> String {
        let sha = object_id("blob", content.as_bytes());
        self.blobs.insert(sha.clone(), content.to_string());
        sha
    }

    fn put_tree(&mut self, files: BTreeMap<String, String>) -> String {
        let mut payload = String::new();
        for (path, blob) in &files {
            payload.push_str(path);
            payload.push('\0');
            payload.push_str(blob);
            payload.push('\n');
        }
        let sha = object_id("tree", payload.as_bytes());
        self.trees.insert(sha.clone(), files);
        sha
    }

    fn put_commit(&mut self, commit: CommitObject) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}",
            commit.tree,
            commit.parents.join(" "),
            self.commits.len(),
            commit.message
        );
        let sha = object_id("commit", payload.as_bytes());
        self.commits.insert(sha.clone(), commit);
        sha
    }

    /// Resolve a branch name or commit id to a commit id.
    fn resolve(&self, reference: &str) -> Option<String> {
        self.refs.get(reference).cloned().or_else(|| {
            self.commits
                .contains_key(reference)
                .then(|| reference.to_string())
        })
    }

    fn files_at(&self, reference: &str) -> Option<&BTreeMap<String, String>> {
        let commit = self.resolve(reference)?;
        let tree = &self.commits.get(&commit)?.tree;
        self.trees.get(tree)
    }

    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut pending = vec![of.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(sha) = pending.pop() {
            if sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                pending.extend(commit.parents.iter().cloned());
            }
        }
        false
    }
}

fn object_id(kind: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// In-memory repository for testing.
///
/// Objects are content addressed. Every call is logged, and a single call
/// kind can be scripted to fail once, which lets tests stop the commit
/// pipeline at any phase and inspect what was left behind.
#[derive(Debug)]
pub struct InMemoryRepository {
    state: Mutex<RemoteState>,
}

impl InMemoryRepository {
    /// Create a repository whose default branch holds one empty commit.
    pub fn new(default_branch: &str) -> Self {
        let mut state = RemoteState {
            default_branch: default_branch.to_string(),
            ..RemoteState::default()
        };
        let tree = state.put_tree(BTreeMap::new());
        let commit = state.put_commit(CommitObject {
            tree,
            parents: Vec::new(),
            message: "initial commit".to_string(),
        });
        state.refs.insert(default_branch.to_string(), commit);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Repository on `main` with the given files committed.
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<String>,
        C: AsRef<str>,
    {
        let mut repo = Self::new("main");
        repo.commit_files("main", files);
        repo
    }

    /// Commit files on top of `branch` (setup helper, not logged).
    pub fn commit_files<P, C>(&mut self, branch: &str, files: impl IntoIterator<Item = (P, C)>)
    where
        P: Into<String>,
        C: AsRef<str>,
    {
        let state = self.state.get_mut();
        let parent = state.refs.get(branch).cloned();
        let mut snapshot = parent
            .as_deref()
            .and_then(|p| state.files_at(p))
            .cloned()
            .unwrap_or_default();
        for (path, content) in files {
            let blob = state.put_blob(content.as_ref());
            snapshot.insert(path.into(), blob);
        }
        let tree = state.put_tree(snapshot);
        let commit = state.put_commit(CommitObject {
            tree,
            parents: parent.into_iter().collect(),
            message: "seed files".to_string(),
        });
        state.refs.insert(branch.to_string(), commit);
    }

    /// Make the next call of `call` fail.
    pub fn fail_on(&self, call: RemoteCall) {
        self.state.lock().fail_on = Some(call);
    }

    /// Make every read of `path` fail.
    pub fn fail_reads_of(&self, path: impl Into<String>) {
        self.state.lock().failing_reads.insert(path.into());
    }

    /// Commit a branch points at.
    pub fn ref_sha(&self, branch: &str) -> Option<String> {
        self.state.lock().refs.get(branch).cloned()
    }

    /// All branch names.
    pub fn branches(&self) -> Vec<String> {
        self.state.lock().refs.keys().cloned().collect()
    }

    /// Content of `path` on a branch or commit.
    pub fn file_at(&self, reference: &str, path: &str) -> Option<String> {
        let state = self.state.lock();
        let blob = state.files_at(reference)?.get(path)?;
        state.blobs.get(blob).cloned()
    }

    /// Parents of a commit.
    pub fn commit_parents(&self, sha: &str) -> Option<Vec<String>> {
        self.state.lock().commits.get(sha).map(|c| c.parents.clone())
    }

    /// Message of a commit.
    pub fn commit_message(&self, sha: &str) -> Option<String> {
        self.state.lock().commits.get(sha).map(|c| c.message.clone())
    }

    /// Pull requests opened so far.
    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        self.state.lock().pulls.clone()
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }

    /// Log of calls made through the trait.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new("main")
    }
}

#[async_trait]
impl RepositoryStore for InMemoryRepository {
    type Error = InMemoryError;

    async fn default_branch(&self) -> Result<String, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::DefaultBranch)?;
        Ok(state.default_branch.clone())
    }

    async fn branch_head(&self, branch: &str) -> Result<BranchHead, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::BranchHead)?;
        let commit_sha = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| InMemoryError::BranchNotFound(branch.to_string()))?;
        let tree_sha = state
            .commits
            .get(&commit_sha)
            .map(|c| c.tree.clone())
            .ok_or_else(|| InMemoryError::ObjectNotFound(commit_sha.clone()))?;
        Ok(BranchHead {
            commit_sha,
            tree_sha,
        })
    }

    async fn list_tree(&self, tree_sha: &str) -> Result<Vec<TreeEntry>, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::ListTree)?;
        let files = state
            .trees
            .get(tree_sha)
            .ok_or_else(|| InMemoryError::ObjectNotFound(tree_sha.to_string()))?;

        let mut directories = BTreeSet::new();
        for path in files.keys() {
            let mut prefix = path.as_str();
            while let Some((parent, _)) = prefix.rsplit_once('/') {
                directories.insert(parent.to_string());
                prefix = parent;
            }
        }

        let mut entries: Vec<TreeEntry> = directories
            .into_iter()
            .map(|path| TreeEntry {
                sha: object_id("tree", path.as_bytes()),
                path,
                kind: TreeEntryKind::Tree,
            })
            .chain(files.iter().map(|(path, blob)| TreeEntry {
                path: path.clone(),
                kind: TreeEntryKind::Blob,
                sha: blob.clone(),
            }))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read_file(&self, path: &str, reference: &str) -> Result<Option<String>, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::ReadFile)?;
        if state.failing_reads.contains(path) {
            return Err(InMemoryError::ReadFailed(path.to_string()));
        }
        let files = state
            .files_at(reference)
            .ok_or_else(|| InMemoryError::BranchNotFound(reference.to_string()))?;
        Ok(files
            .get(path)
            .and_then(|blob| state.blobs.get(blob))
            .cloned())
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::CreateRef)?;
        if state.refs.contains_key(branch) {
            return Err(InMemoryError::RefExists(branch.to_string()));
        }
        if !state.commits.contains_key(sha) {
            return Err(InMemoryError::ObjectNotFound(sha.to_string()));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_blob(&self, content: &str) -> Result<String, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::CreateBlob)?;
        Ok(state.put_blob(content))
    }

    async fn create_tree(&self, base_tree: &str, entries: &[NewTreeEntry]) -> Result<String, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::CreateTree)?;
        let mut files = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| InMemoryError::ObjectNotFound(base_tree.to_string()))?;
        for entry in entries {
            if !state.blobs.contains_key(&entry.sha) {
                return Err(InMemoryError::ObjectNotFound(entry.sha.clone()));
            }
            files.insert(entry.path.clone(), entry.sha.clone());
        }
        Ok(state.put_tree(files))
    }

    async fn create_commit(&self, message: &str, tree_sha: &str, parents: &[String]) -> Result<String, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::CreateCommit)?;
        if !state.trees.contains_key(tree_sha) {
            return Err(InMemoryError::ObjectNotFound(tree_sha.to_string()));
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(InMemoryError::ObjectNotFound(missing.clone()));
        }
        Ok(state.put_commit(CommitObject {
            tree: tree_sha.to_string(),
            parents: parents.to_vec(),
            message: message.to_string(),
        }))
    }

    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<(), Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::UpdateRef)?;
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| InMemoryError::BranchNotFound(branch.to_string()))?;
        if !state.commits.contains_key(sha) {
            return Err(InMemoryError::ObjectNotFound(sha.to_string()));
        }
        if !force && !state.is_ancestor(&current, sha) {
            return Err(InMemoryError::NotFastForward(branch.to_string()));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest, Self::Error> {
        let mut state = self.state.lock();
        state.record(RemoteCall::CreatePullRequest)?;
        for branch in [&request.head, &request.base] {
            if !state.refs.contains_key(branch) {
                return Err(InMemoryError::BranchNotFound(branch.clone()));
            }
        }
        state.pulls.push(request.clone());
        let number = state.pulls.len() as u64;
        Ok(PullRequest {
            number,
            url: format!("memory://pulls/{}", number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_files_are_readable() {
        let repo = InMemoryRepository::with_files([("apps/web/package.json", "{}")]);
        let content = repo.read_file("apps/web/package.json", "main").await.unwrap();
        assert_eq!(content.as_deref(), Some("{}"));
        assert!(repo.read_file("missing", "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_tree_includes_directories() {
        let repo = InMemoryRepository::with_files([("apps/web/package.json", "{}")]);
        let head = repo.branch_head("main").await.unwrap();
        let entries = repo.list_tree(&head.tree_sha).await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            paths,
            vec![
                ("apps", TreeEntryKind::Tree),
                ("apps/web", TreeEntryKind::Tree),
                ("apps/web/package.json", TreeEntryKind::Blob),
            ]
        );
    }

    #[tokio::test]
    async fn test_tree_layers_over_base() {
        let repo = InMemoryRepository::with_files([("a.txt", "a"), ("b.txt", "b")]);
        let head = repo.branch_head("main").await.unwrap();
        let blob = repo.create_blob("b2").await.unwrap();
        let tree = repo
            .create_tree(&head.tree_sha, &[NewTreeEntry::blob("b.txt", blob)])
            .await
            .unwrap();
        let commit = repo
            .create_commit("update b", &tree, &[head.commit_sha.clone()])
            .await
            .unwrap();
        assert_eq!(repo.file_at(&commit, "a.txt").as_deref(), Some("a"));
        assert_eq!(repo.file_at(&commit, "b.txt").as_deref(), Some("b2"));
        assert_eq!(repo.file_at("main", "b.txt").as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let repo = InMemoryRepository::default();
        repo.fail_on(RemoteCall::CreateBlob);
        assert_eq!(
            repo.create_blob("x").await,
            Err(InMemoryError::Injected(RemoteCall::CreateBlob))
        );
        assert!(repo.create_blob("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_ref_rejects_duplicates() {
        let repo = InMemoryRepository::default();
        let head = repo.branch_head("main").await.unwrap();
        repo.create_ref("feature", &head.commit_sha).await.unwrap();
        assert_eq!(
            repo.create_ref("feature", &head.commit_sha).await,
            Err(InMemoryError::RefExists("feature".to_string()))
        );
    }

    #[tokio::test]
    async fn test_update_ref_requires_force_when_diverged() {
        let repo = InMemoryRepository::with_files([("a.txt", "a")]);
        let head = repo.branch_head("main").await.unwrap();
        let orphan = repo.create_commit("orphan", &head.tree_sha, &[]).await.unwrap();
        assert!(matches!(
            repo.update_ref("main", &orphan, false).await,
            Err(InMemoryError::NotFastForward(_))
        ));
        repo.update_ref("main", &orphan, true).await.unwrap();
        assert_eq!(repo.ref_sha("main"), Some(orphan));
    }
}
