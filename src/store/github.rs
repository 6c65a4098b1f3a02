//! GitHub REST backend.
//!
//! ## Configuration
//!
//! Built from [`GitHubConfig`](crate::config::GitHubConfig):
//! - `GITHUB_REPOSITORY`: `owner/repo` (required)
//! - `GITHUB_TOKEN`: API token (required)
//! - `GITHUB_API_URL`: API base URL (default: `https://api.github.com`)
//!
//! Any non-2xx response becomes [`GitHubError::Api`] carrying the status and
//! the response body unchanged. Nothing is retried. A recursive tree listing
//! the API cut short is refused rather than returned partially.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::GitHubConfig;
use crate::types::{
    BranchHead, NewPullRequest, NewTreeEntry, PullRequest, TreeEntry, TreeEntryKind,
};
use super::RepositoryStore;

const USER_AGENT: &str = concat!("monorepo-harmonizer/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Error type for the GitHub backend.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// The API answered with a non-success status.
    #[error("GitHub API error {status} on {method} {path}: {body}")]
    Api {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// The request never produced a response.
    #[error("GitHub transport error on {path}: {source}")]
    Transport {
        /// Request path.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The configured API base URL cannot carry request paths.
    #[error("Invalid GitHub API URL {url}: {message}")]
    InvalidUrl {
        /// Configured base URL.
        url: String,
        /// Parser message.
        message: String,
    },
    /// The recursive tree listing was cut off by the API.
    #[error("GitHub truncated the recursive listing of tree {tree}")]
    TruncatedTree {
        /// Tree that was listed.
        tree: String,
    },
    /// The response body did not have the expected shape.
    #[error("Unexpected GitHub response on {path}: {message}")]
    Decode {
        /// Request path.
        path: String,
        /// Decoder message.
        message: String,
    },
}

/// GitHub repository accessed over the REST API.
#[derive(Clone)]
pub struct GitHubRepository {
    client: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubRepository {
    /// Create a backend from configuration.
    pub fn new(config: &GitHubConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
        }
    }

    /// `owner/repo` this backend talks to.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Repository endpoint below `/repos/{owner}/{repo}`.
    ///
    /// Each `/`-separated piece of `segments` is percent-encoded as one path
    /// segment, so branch names and file paths cannot leak into the query
    /// or fragment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubError> {
        let invalid = |message: String| GitHubError::InvalidUrl {
            url: self.api_url.clone(),
            message,
        };
        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments.iter().flat_map(|s| s.split('/')));
        Ok(url)
    }

    fn contents_url(&self, path: &str, reference: &str) -> Result<Url, GitHubError> {
        let mut url = self.endpoint(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", reference);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_as(method, url, "application/vnd.github+json")
    }

    fn request_as(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, method: Method, url: &Url, builder: RequestBuilder) -> Result<String, GitHubError> {
        let path = url.path();
        tracing::debug!(method = %method, path = %path, "GitHub request");
        let response = builder.send().await.map_err(|source| GitHubError::Transport {
            path: path.to_string(),
            source,
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| GitHubError::Transport {
            path: path.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(GitHubError::Api {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GitHubError> {
        let body = self
            .send(Method::GET, &url, self.request(Method::GET, url.clone()))
            .await?;
        decode(url.path(), &body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        payload: serde_json::Value,
    ) -> Result<T, GitHubError> {
        let builder = self.request(method.clone(), url.clone()).json(&payload);
        let body = self.send(method, &url, builder).await?;
        decode(url.path(), &body)
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, GitHubError> {
    serde_json::from_str(body).map_err(|e| GitHubError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct ShaObject {
    sha: String,
}

#[derive(Deserialize)]
struct RefInfo {
    object: ShaObject,
}

#[derive(Deserialize)]
struct CommitInfo {
    tree: ShaObject,
}

#[derive(Deserialize)]
struct RawTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: TreeEntryKind,
    sha: String,
}

#[derive(Deserialize)]
struct TreeListing {
    tree: Vec<RawTreeEntry>,
    #[serde(default)]
    truncated: bool,
}

/// Flatten a listing, refusing one the API cut short.
fn tree_entries(tree_sha: &str, listing: TreeListing) -> Result<Vec<TreeEntry>, GitHubError> {
    if listing.truncated {
        return Err(GitHubError::TruncatedTree {
            tree: tree_sha.to_string(),
        });
    }
    Ok(listing
        .tree
        .into_iter()
        .map(|e| TreeEntry {
            path: e.path,
            kind: e.kind,
            sha: e.sha,
        })
        .collect())
}

#[derive(Deserialize)]
struct PullInfo {
    number: u64,
    html_url: String,
}

#[async_trait]
impl RepositoryStore for GitHubRepository {
    type Error = GitHubError;

    async fn default_branch(&self) -> Result<String, Self::Error> {
        let info: RepoInfo = self.get_json(self.endpoint(&[])?).await?;
        Ok(info.default_branch)
    }

    async fn branch_head(&self, branch: &str) -> Result<BranchHead, Self::Error> {
        let reference: RefInfo = self
            .get_json(self.endpoint(&["git", "ref", "heads", branch])?)
            .await?;
        let commit: CommitInfo = self
            .get_json(self.endpoint(&["git", "commits", &reference.object.sha])?)
            .await?;
        Ok(BranchHead {
            commit_sha: reference.object.sha,
            tree_sha: commit.tree.sha,
        })
    }

    async fn list_tree(&self, tree_sha: &str) -> Result<Vec<TreeEntry>, Self::Error> {
        let mut url = self.endpoint(&["git", "trees", tree_sha])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let listing: TreeListing = self.get_json(url).await?;
        tree_entries(tree_sha, listing)
    }

    async fn read_file(&self, path: &str, reference: &str) -> Result<Option<String>, Self::Error> {
        let url = self.contents_url(path, reference)?;
        let builder = self.request_as(Method::GET, url.clone(), "application/vnd.github.raw");
        match self.send(Method::GET, &url, builder).await {
            Ok(body) => Ok(Some(body)),
            Err(GitHubError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<(), Self::Error> {
        let _: serde_json::Value = self
            .send_json(
                Method::POST,
                self.endpoint(&["git", "refs"])?,
                json!({ "ref": format!("refs/heads/{}", branch), "sha": sha }),
            )
            .await?;
        Ok(())
    }

    async fn create_blob(&self, content: &str) -> Result<String, Self::Error> {
        let blob: ShaObject = self
            .send_json(
                Method::POST,
                self.endpoint(&["git", "blobs"])?,
                json!({ "content": content, "encoding": "utf-8" }),
            )
            .await?;
        Ok(blob.sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: &[NewTreeEntry]) -> Result<String, Self::Error> {
        let tree: ShaObject = self
            .send_json(
                Method::POST,
                self.endpoint(&["git", "trees"])?,
                json!({ "base_tree": base_tree, "tree": entries }),
            )
            .await?;
        Ok(tree.sha)
    }

    async fn create_commit(&self, message: &str, tree_sha: &str, parents: &[String]) -> Result<String, Self::Error> {
        let commit: ShaObject = self
            .send_json(
                Method::POST,
                self.endpoint(&["git", "commits"])?,
                json!({ "message": message, "tree": tree_sha, "parents": parents }),
            )
            .await?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<(), Self::Error> {
        let _: serde_json::Value = self
            .send_json(
                Method::PATCH,
                self.endpoint(&["git", "refs", "heads", branch])?,
                json!({ "sha": sha, "force": force }),
            )
            .await?;
        Ok(())
    }

    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest, Self::Error> {
        let pull: PullInfo = self
            .send_json(Method::POST, self.endpoint(&["pulls"])?, json!(request))
            .await?;
        Ok(PullRequest {
            number: pull.number,
            url: pull.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GitHubConfig {
        GitHubConfig {
            owner: "acme".to_string(),
            repo: "monorepo".to_string(),
            token: "t0ken".to_string(),
            api_url: "https://api.github.com/".to_string(),
            default_branch: None,
        }
    }

    #[test]
    fn test_endpoint() {
        let repo = GitHubRepository::new(&config());
        assert_eq!(repo.full_name(), "acme/monorepo");
        assert_eq!(
            repo.endpoint(&["git", "blobs"]).unwrap().as_str(),
            "https://api.github.com/repos/acme/monorepo/git/blobs"
        );
        assert_eq!(
            repo.endpoint(&[]).unwrap().as_str(),
            "https://api.github.com/repos/acme/monorepo"
        );
    }

    #[test]
    fn test_endpoint_keeps_enterprise_prefix() {
        let mut enterprise = config();
        enterprise.api_url = "https://ghe.example.com/api/v3".to_string();
        let repo = GitHubRepository::new(&enterprise);
        assert_eq!(
            repo.endpoint(&["pulls"]).unwrap().path(),
            "/api/v3/repos/acme/monorepo/pulls"
        );
    }

    #[test]
    fn test_branch_and_file_names_are_encoded() {
        let repo = GitHubRepository::new(&config());
        let head = repo.endpoint(&["git", "ref", "heads", "harmonize/fix#1"]).unwrap();
        assert_eq!(head.path(), "/repos/acme/monorepo/git/ref/heads/harmonize/fix%231");
        assert_eq!(head.fragment(), None);

        let file = repo.contents_url("apps/a?b/50%/package.json", "feat#2").unwrap();
        assert_eq!(file.path(), "/repos/acme/monorepo/contents/apps/a%3Fb/50%25/package.json");
        assert_eq!(file.query(), Some("ref=feat%232"));
        assert_eq!(file.fragment(), None);
    }

    #[test]
    fn test_invalid_api_url() {
        let mut broken = config();
        broken.api_url = "not a url".to_string();
        let repo = GitHubRepository::new(&broken);
        assert!(matches!(repo.endpoint(&["pulls"]), Err(GitHubError::InvalidUrl { .. })));
    }

    #[test]
    fn test_truncated_listing_is_an_error() {
        let listing: TreeListing = decode(
            "/t",
            r#"{"sha":"x","truncated":true,"tree":[{"path":"apps/web/package.json","type":"blob","sha":"2"}]}"#,
        )
        .unwrap();
        let error = tree_entries("x", listing).unwrap_err();
        assert!(matches!(error, GitHubError::TruncatedTree { ref tree } if tree == "x"));
    }

    #[test]
    fn test_api_error_is_verbatim() {
        let error = GitHubError::Api {
            method: "POST".to_string(),
            path: "/repos/acme/monorepo/git/refs".to_string(),
            status: 422,
            body: r#"{"message":"Reference already exists"}"#.to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("422"));
        assert!(display.contains("Reference already exists"));
    }

    #[test]
    fn test_tree_listing_decodes() {
        let listing: TreeListing = decode(
            "/t",
            r#"{"sha":"x","tree":[{"path":"apps","type":"tree","sha":"1","mode":"040000"},
                {"path":"apps/web/package.json","type":"blob","sha":"2","mode":"100644","size":10}]}"#,
        )
        .unwrap();
        assert_eq!(listing.tree.len(), 2);
        assert_eq!(listing.tree[1].kind, TreeEntryKind::Blob);
        assert!(!listing.truncated);
        let entries = tree_entries("x", listing).unwrap();
        assert_eq!(entries[1].path, "apps/web/package.json");
    }
}
