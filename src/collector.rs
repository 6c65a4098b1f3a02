//! Manifest collection.
//!
//! Lists the base tree once, picks every `package.json` below one of the
//! requested path prefixes and reads them one by one. A manifest that cannot
//! be read or parsed still yields a [`Module`], with no manifest, so a single
//! broken file never aborts the pass.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::RepositoryStore;
use crate::types::{BranchHead, Manifest, Module, TreeEntryKind, MANIFEST_FILE_NAME};

/// Error type for collection.
///
/// Only failures to enumerate the tree propagate; per-manifest problems are
/// absorbed.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The tree listing failed.
    #[error("Store error: {0}")]
    StoreError(String),
}

/// Whether `path` is a manifest below one of `prefixes`.
///
/// A prefix matches when the path starts with `prefix + "/"`. Vendored
/// manifests under `node_modules` are ignored.
pub fn is_manifest_path(path: &str, prefixes: &[String]) -> bool {
    let is_manifest = path == MANIFEST_FILE_NAME || path.ends_with(&format!("/{}", MANIFEST_FILE_NAME));
    if !is_manifest || path.split('/').any(|segment| segment == "node_modules") {
        return false;
    }
    prefixes.iter().any(|prefix| {
        let prefix = prefix.trim_matches('/');
        !prefix.is_empty()
            && path.len() > prefix.len()
            && path.starts_with(prefix)
            && path[prefix.len()..].starts_with('/')
    })
}

/// Build a module from manifest text, degrading to an empty contributor.
pub fn parse_module(path: &str, text: Option<&str>) -> Module {
    let manifest = match text {
        Some(text) => match Manifest::parse(text) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = %path, error = %e, "Manifest is not valid JSON, treating as empty");
                None
            }
        },
        None => None,
    };
    Module::new(path, manifest)
}

/// Collects modules from a repository snapshot.
pub struct ManifestCollector<S: RepositoryStore> {
    store: Arc<S>,
}

impl<S: RepositoryStore + 'static> ManifestCollector<S> {
    /// Create a collector over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Collect every module below `prefixes` at the commit `head`.
    ///
    /// Modules come back in tree order, which is the collection order the
    /// reconciliation tie-breaks depend on.
    pub async fn collect(&self, head: &BranchHead, prefixes: &[String]) -> Result<Vec<Module>, CollectError> {
        let entries = self
            .store
            .list_tree(&head.tree_sha)
            .await
            .map_err(|e| CollectError::StoreError(e.to_string()))?;

        let paths: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == TreeEntryKind::Blob && is_manifest_path(&e.path, prefixes))
            .map(|e| e.path)
            .collect();
        debug!(count = paths.len(), "Manifest paths selected");

        let mut modules = Vec::with_capacity(paths.len());
        for path in paths {
            let text = match self.store.read_file(&path, &head.commit_sha).await {
                Ok(Some(text)) => Some(text),
                Ok(None) => {
                    warn!(path = %path, "Manifest listed in tree but not readable");
                    None
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Manifest read failed, treating as empty");
                    None
                }
            };
            modules.push(parse_module(&path, text.as_deref()));
        }
        Ok(modules)
    }
}
