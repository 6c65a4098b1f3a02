//! # monorepo-harmonizer
//!
//! Deterministic reconciliation of build metadata across the modules of a
//! monorepo.
//!
//! The harmonizer answers one question:
//!
//! > Given every module's `package.json`, which script and dependency value
//! > should each module end up with?
//!
//! ## Core Contract
//!
//! 1. Collect every manifest below a set of path prefixes
//! 2. Classify each script and dependency key as uniform or needing a decision
//! 3. Write decisions back into the manifests that already hold the key
//! 4. Commit the changed manifests on a new branch and open a pull request
//!
//! Separately, source files present under the same relative path in several
//! components are grouped and handed to a unifier, and accepted merges can be
//! written into a local component.
//!
//! ## Architecture
//!
//! ```text
//! RepositoryStore → ManifestCollector → reconcile → harmonize → RemoteCommitPipeline
//!                                                                  ↓
//!                                                        branch + commit + PR
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same modules in the same collection order → identical suggestions and fingerprint
//! - Ties between equally common values go to the value seen first
//! - Ties between equal version tuples go to the value seen first

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod store;
pub mod config;
pub mod canonical;
pub mod version;
pub mod collector;
pub mod reconcile;
pub mod harmonize;
pub mod pipeline;
pub mod harmonizer;
pub mod unify;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    BranchHead, CommitOutcome, CommitPlan, Component, DependencyScope, FileEntry, FileVersionGroup,
    Manifest, Module, ModuleKind, ModuleSummary, Reconciliation, ReconciliationSummary,
    Suggestion, SuggestionSets, UnificationPreview, UnificationSuggestion, VersionExcerpt,
};
pub use store::{InMemoryRepository, RepositoryStore};
#[cfg(feature = "remote")]
pub use store::GitHubRepository;
pub use config::{ConfigError, HarmonizerConfig};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use version::VersionTuple;
pub use collector::{CollectError, ManifestCollector};
pub use reconcile::{reconcile, CrossModuleValueMap};
pub use harmonize::{commit_plan, harmonize, HarmonizedManifest};
pub use pipeline::{CommitPhase, PipelineError, RemoteCommitPipeline, RemoteResidue};
pub use harmonizer::{ApplyOutcome, HarmonizePlan, Harmonizer, HarmonizerError, DEFAULT_COMMIT_TITLE};
pub use unify::{Unification, Unifier, UnifyError, WorkspaceError};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Crate version, reported by the health probe.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
