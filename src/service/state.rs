//! Shared service state.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::HarmonizerConfig;
use crate::harmonizer::Harmonizer;
use crate::store::RepositoryStore;
use crate::unify::{OpenAiUnifier, Unifier};

/// Shared service state.
///
/// Holds only configuration and long-lived clients. Every request builds its
/// own modules, suggestions and commit plan from scratch.
pub struct ServiceState<R: RepositoryStore + 'static> {
    /// Repository the manifests live in.
    pub store: Arc<R>,
    /// Prefixes scanned when a request names none.
    pub module_paths: Vec<String>,
    /// Base branch override.
    pub base_branch: Option<String>,
    /// Root under which component paths resolve.
    pub workspace_root: PathBuf,
    /// Unify collaborator; `None` means placeholder mode.
    pub unifier: Option<Arc<dyn Unifier>>,
}

impl<R: RepositoryStore + 'static> ServiceState<R> {
    /// Create state with no base branch override and no unifier.
    pub fn new(store: R, module_paths: Vec<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(store),
            module_paths,
            base_branch: None,
            workspace_root: workspace_root.into(),
            unifier: None,
        }
    }

    /// Create state from process configuration.
    ///
    /// The unifier is enabled only when an API key is configured.
    pub fn from_config(store: R, config: &HarmonizerConfig) -> Self {
        let unifier = OpenAiUnifier::from_config(&config.unify);
        match &unifier {
            Some(u) => tracing::info!(model = %u.model(), "Unify collaborator enabled"),
            None => tracing::warn!("OPENAI_API_KEY not set, file unification returns placeholders"),
        }

        let mut state = Self::new(store, config.module_paths.clone(), config.workspace_root.clone());
        state.base_branch = config.github.default_branch.clone();
        state.unifier = unifier.map(|u| Arc::new(u) as Arc<dyn Unifier>);
        state
    }

    /// Override the base branch.
    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = Some(branch.into());
        self
    }

    /// Install a unifier.
    pub fn with_unifier(mut self, unifier: Arc<dyn Unifier>) -> Self {
        self.unifier = Some(unifier);
        self
    }

    /// Plan/apply use case over this state's store.
    pub fn harmonizer(&self) -> Harmonizer<R> {
        Harmonizer::new(
            Arc::clone(&self.store),
            self.module_paths.clone(),
            self.base_branch.clone(),
        )
    }
}

impl<R: RepositoryStore + 'static> Clone for ServiceState<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            module_paths: self.module_paths.clone(),
            base_branch: self.base_branch.clone(),
            workspace_root: self.workspace_root.clone(),
            unifier: self.unifier.clone(),
        }
    }
}
