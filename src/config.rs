//! Process configuration.
//!
//! All settings come from environment variables:
//! - `GITHUB_REPOSITORY`: `owner/repo` identifier (required)
//! - `GITHUB_TOKEN`: API token for the repository provider (required)
//! - `GITHUB_DEFAULT_BRANCH`: base branch override (default: the repository's default branch)
//! - `GITHUB_API_URL`: API base URL (default: `https://api.github.com`)
//! - `HARMONIZER_MODULE_PATHS`: comma-separated path prefixes (default: `apps,packages`)
//! - `HARMONIZER_WORKSPACE_ROOT`: local root for file unification (default: current directory)
//! - `OPENAI_API_KEY`: enables the unify collaborator (default: unset, placeholder mode)
//! - `OPENAI_MODEL`: model used for unification (default: `gpt-4o-mini`)
//! - `OPENAI_BASE_URL`: chat-completions base URL (default: `https://api.openai.com/v1`)
//! - `HOST` / `PORT`: bind address (default: `0.0.0.0` / `8080`)

use std::path::PathBuf;

/// Default path prefixes scanned for manifests.
pub const DEFAULT_MODULE_PATHS: &[&str] = &["apps", "packages"];

/// Default GitHub API base URL.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default model for unification.
pub const DEFAULT_UNIFY_MODEL: &str = "gpt-4o-mini";

/// Default chat-completions base URL.
pub const DEFAULT_UNIFY_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    /// A variable has an unusable value.
    #[error("Invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Repository provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// API token.
    pub token: String,
    /// API base URL.
    pub api_url: String,
    /// Base branch override.
    pub default_branch: Option<String>,
}

/// Unify collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifyConfig {
    /// API key; `None` means placeholder mode.
    pub api_key: Option<String>,
    /// Model name.
    pub model: String,
    /// Chat-completions base URL.
    pub base_url: String,
}

impl Default for UnifyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_UNIFY_MODEL.to_string(),
            base_url: DEFAULT_UNIFY_BASE_URL.to_string(),
        }
    }
}

/// Full harmonizer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonizerConfig {
    /// Repository provider.
    pub github: GitHubConfig,
    /// Path prefixes used when a request names none.
    pub module_paths: Vec<String>,
    /// Local root under which components are resolved.
    pub workspace_root: PathBuf,
    /// Unify collaborator.
    pub unify: UnifyConfig,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl HarmonizerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let repository = var("GITHUB_REPOSITORY").ok_or(ConfigError::Missing("GITHUB_REPOSITORY"))?;
        let (owner, repo) = parse_repository(&repository)?;
        let token = var("GITHUB_TOKEN").ok_or(ConfigError::Missing("GITHUB_TOKEN"))?;

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                message: format!("not a port number: {}", raw),
            })?,
            None => 8080,
        };

        let module_paths = var("HARMONIZER_MODULE_PATHS")
            .map(|raw| parse_module_paths(&raw))
            .filter(|paths| !paths.is_empty())
            .unwrap_or_else(|| DEFAULT_MODULE_PATHS.iter().map(|p| p.to_string()).collect());

        Ok(Self {
            github: GitHubConfig {
                owner,
                repo,
                token,
                api_url: var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
                default_branch: var("GITHUB_DEFAULT_BRANCH"),
            },
            module_paths,
            workspace_root: var("HARMONIZER_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            unify: UnifyConfig {
                api_key: var("OPENAI_API_KEY"),
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_UNIFY_MODEL.to_string()),
                base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_UNIFY_BASE_URL.to_string()),
            },
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }
}

/// Split `owner/repo`.
pub fn parse_repository(raw: &str) -> Result<(String, String), ConfigError> {
    let invalid = || ConfigError::Invalid {
        name: "GITHUB_REPOSITORY",
        message: format!("expected owner/repo, got {:?}", raw),
    };
    let (owner, repo) = raw.trim().split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(invalid());
    }
    Ok((owner.to_string(), repo.to_string()))
}

/// Split a comma-separated prefix list, trimming whitespace and slashes.
pub fn parse_module_paths(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().trim_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
