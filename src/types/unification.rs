//! Types for same-path source file unification across components.

use serde::{Deserialize, Serialize};

/// A component whose source tree takes part in unification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    /// Display name.
    pub name: String,
    /// Root directory, relative to the workspace root.
    pub path: String,
}

impl Component {
    /// Create a component.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// One component's copy of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Owning component name.
    pub component: String,
    /// Location on disk.
    pub absolute_path: String,
    /// Full file content.
    pub content: String,
}

/// All copies of one relative path, present in at least two components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersionGroup {
    /// Path relative to each component root, `/`-separated.
    pub relative_path: String,
    /// One entry per contributing component, in component order.
    pub entries: Vec<FileEntry>,
    /// All copies are byte-identical. Informational; the group is kept anyway.
    pub identical: bool,
}

/// Bounded excerpt of one version handed to the unifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionExcerpt {
    /// Component the version came from.
    pub component: String,
    /// Content prefix.
    pub content: String,
}

/// Proposed single version of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnificationSuggestion {
    /// Path relative to component roots.
    pub relative_path: String,
    /// Merged file text; empty for a placeholder.
    pub merged_text: String,
    /// Why the merge looks the way it does.
    pub rationale: String,
}

impl UnificationSuggestion {
    /// Whether this suggestion carries merged content that can be written.
    pub fn is_applicable(&self) -> bool {
        !self.merged_text.trim().is_empty()
    }
}

/// Result of a preview run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnificationPreview {
    /// Groups found.
    pub diffs: Vec<FileVersionGroup>,
    /// One suggestion per group.
    pub suggestions: Vec<UnificationSuggestion>,
}
