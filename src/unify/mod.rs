//! Same-path source file unification.
//!
//! Files that exist under the same relative path in several components are
//! grouped, and each group is handed to a [`Unifier`] that proposes one
//! merged version. Without a unifier, or when it fails, a group yields a
//! placeholder suggestion with empty merged text. The orchestrator never
//! writes merged code of its own.

pub mod orchestrator;
#[cfg(feature = "remote")]
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{UnificationSuggestion, VersionExcerpt};

pub use orchestrator::{
    apply_suggestions, build_suggestions, collect_diffs, excerpt, preview, resolve_within,
    WorkspaceError, MAX_EXCERPT_CHARS, RECOGNIZED_EXTENSIONS, SKIPPED_DIRECTORIES,
};
#[cfg(feature = "remote")]
pub use openai::OpenAiUnifier;

/// Rationale attached to placeholder suggestions.
pub const PLACEHOLDER_RATIONALE: &str =
    "No unification service is available; review the versions and harmonize this file manually.";

/// A merged version proposed by a unifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unification {
    /// Merged file text.
    pub merged_text: String,
    /// Why the merge looks the way it does.
    pub rationale: String,
}

/// Errors from a unifier. All of them degrade to a placeholder.
#[derive(Debug, thiserror::Error)]
pub enum UnifyError {
    /// The remote call failed or returned a non-success status.
    #[error("Unify request failed: {0}")]
    Request(String),
    /// The reply was not the expected JSON object.
    #[error("Unify reply not understood: {0}")]
    InvalidReply(String),
}

/// Proposes one version of a file from several.
#[async_trait]
pub trait Unifier: Send + Sync {
    /// Merge `versions` of the file at `path`.
    async fn unify(&self, path: &str, versions: &[VersionExcerpt]) -> Result<Unification, UnifyError>;
}

/// Placeholder suggestion for a group that could not be unified.
pub fn placeholder(relative_path: &str) -> UnificationSuggestion {
    UnificationSuggestion {
        relative_path: relative_path.to_string(),
        merged_text: String::new(),
        rationale: PLACEHOLDER_RATIONALE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_not_applicable() {
        let suggestion = placeholder("src/a.ts");
        assert!(!suggestion.is_applicable());
        assert!(suggestion.rationale.contains("manually"));
    }

    #[test]
    fn test_unification_wire_format() {
        let parsed: Unification =
            serde_json::from_str(r#"{"mergedText":"export {}","rationale":"same"}"#).unwrap();
        assert_eq!(parsed.merged_text, "export {}");
    }
}
