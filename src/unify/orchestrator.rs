//! File unification orchestrator.
//!
//! Walks every component directory, indexes recognized source files by their
//! path relative to the component root, and keeps the paths present in at
//! least two components. Groups are kept even when all copies are identical.

use std::collections::BTreeMap;
use std::path::{Component as PathComponent, Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{placeholder, Unifier};
use crate::types::{
    Component, FileEntry, FileVersionGroup, UnificationPreview, UnificationSuggestion, VersionExcerpt,
};

/// Extensions considered source files.
pub const RECOGNIZED_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "css", "scss"];

/// Directory names never descended into.
pub const SKIPPED_DIRECTORIES: &[&str] = &["node_modules", ".git", "dist", "build", ".next", "coverage"];

/// Characters of each version handed to the unifier.
pub const MAX_EXCERPT_CHARS: usize = 6000;

/// Errors touching the local workspace.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// A path is absolute or climbs out of its root.
    #[error("Path escapes its root: {0}")]
    UnsafePath(String),
    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Join `relative` onto `root`, refusing absolute paths and `..` segments.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, WorkspaceError> {
    let candidate = Path::new(relative);
    let mut resolved = root.to_path_buf();
    for part in candidate.components() {
        match part {
            PathComponent::Normal(segment) => resolved.push(segment),
            PathComponent::CurDir => {}
            PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_) => {
                return Err(WorkspaceError::UnsafePath(relative.to_string()));
            }
        }
    }
    Ok(resolved)
}

fn is_recognized(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| RECOGNIZED_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|parts| parts.join("/"))
}

/// Group same-path files across components.
///
/// Component paths are resolved under `root`. A component whose directory
/// does not exist contributes nothing. Groups come back sorted by relative
/// path, entries in component order.
pub fn collect_diffs(root: &Path, components: &[Component]) -> Result<Vec<FileVersionGroup>, WorkspaceError> {
    let mut index: BTreeMap<String, Vec<FileEntry>> = BTreeMap::new();

    for component in components {
        let dir = resolve_within(root, &component.path)?;
        if !dir.is_dir() {
            warn!(component = %component.name, path = %dir.display(), "Component directory not found, skipping");
            continue;
        }

        let mut files = 0usize;
        for entry in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && SKIPPED_DIRECTORIES.contains(&e.file_name().to_str().unwrap_or("")))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_recognized(e.path()))
        {
            let Some(relative) = relative_key(&dir, entry.path()) else {
                continue;
            };
            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Unreadable source file, skipping");
                    continue;
                }
            };
            let versions = index.entry(relative).or_default();
            if versions.iter().any(|v| v.component == component.name) {
                continue;
            }
            versions.push(FileEntry {
                component: component.name.clone(),
                absolute_path: entry.path().display().to_string(),
                content,
            });
            files += 1;
        }
        debug!(component = %component.name, files, "Component indexed");
    }

    let groups: Vec<FileVersionGroup> = index
        .into_iter()
        .filter(|(_, entries)| entries.len() >= 2)
        .map(|(relative_path, entries)| {
            let identical = entries.windows(2).all(|w| w[0].content == w[1].content);
            FileVersionGroup {
                relative_path,
                entries,
                identical,
            }
        })
        .collect();

    info!(
        components = components.len(),
        groups = groups.len(),
        identical = groups.iter().filter(|g| g.identical).count(),
        "Shared files grouped"
    );
    Ok(groups)
}

/// First [`MAX_EXCERPT_CHARS`] characters of `content`.
pub fn excerpt(content: &str) -> String {
    match content.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((end, _)) => content[..end].to_string(),
        None => content.to_string(),
    }
}

/// One suggestion per group, in group order.
///
/// Groups are unified one at a time. A missing unifier or a failed call
/// yields a placeholder for that group only.
pub async fn build_suggestions(
    groups: &[FileVersionGroup],
    unifier: Option<&dyn Unifier>,
) -> Vec<UnificationSuggestion> {
    let Some(unifier) = unifier else {
        if !groups.is_empty() {
            warn!(groups = groups.len(), "No unifier configured, returning placeholders");
        }
        return groups.iter().map(|g| placeholder(&g.relative_path)).collect();
    };

    let mut suggestions = Vec::with_capacity(groups.len());
    for group in groups {
        let versions: Vec<VersionExcerpt> = group
            .entries
            .iter()
            .map(|e| VersionExcerpt {
                component: e.component.clone(),
                content: excerpt(&e.content),
            })
            .collect();
        let suggestion = match unifier.unify(&group.relative_path, &versions).await {
            Ok(unified) => UnificationSuggestion {
                relative_path: group.relative_path.clone(),
                merged_text: unified.merged_text,
                rationale: unified.rationale,
            },
            Err(e) => {
                warn!(path = %group.relative_path, error = %e, "Unify failed, using placeholder");
                placeholder(&group.relative_path)
            }
        };
        suggestions.push(suggestion);
    }
    suggestions
}

/// Group and unify in one pass.
pub async fn preview(
    root: &Path,
    components: &[Component],
    unifier: Option<&dyn Unifier>,
) -> Result<UnificationPreview, WorkspaceError> {
    let diffs = collect_diffs(root, components)?;
    let suggestions = build_suggestions(&diffs, unifier).await;
    Ok(UnificationPreview { diffs, suggestions })
}

/// Write merged contents into the target component.
///
/// Placeholders are skipped. Every path is checked before anything is
/// written, so an unsafe suggestion rejects the whole batch. Returns the
/// number of files written.
pub fn apply_suggestions(
    root: &Path,
    target_path: &str,
    suggestions: &[UnificationSuggestion],
) -> Result<usize, WorkspaceError> {
    let target = resolve_within(root, target_path)?;

    let mut writes = Vec::new();
    for suggestion in suggestions.iter().filter(|s| s.is_applicable()) {
        let destination = resolve_within(&target, &suggestion.relative_path)?;
        if destination == target {
            return Err(WorkspaceError::UnsafePath(suggestion.relative_path.clone()));
        }
        writes.push((destination, &suggestion.merged_text));
    }

    for (destination, content) in &writes {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        std::fs::write(destination, content).map_err(|e| WorkspaceError::io(destination, e))?;
        debug!(path = %destination.display(), "Unified file written");
    }

    info!(target = %target.display(), applied = writes.len(), "Unified files applied");
    Ok(writes.len())
}
