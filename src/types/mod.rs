//! Core types for the harmonizer.

pub mod module;
pub mod suggestion;
pub mod unification;
pub mod commit;

pub use module::{
    Module, ModuleKind, ModuleSummary, Manifest, DependencyScope,
    MANIFEST_FILE_NAME, SCRIPTS, DEPENDENCIES, DEV_DEPENDENCIES,
};
pub use suggestion::{
    ModuleValue, Suggestion, Reconciliation, ReconciliationSummary, SuggestionSets,
};
pub use unification::{
    Component, FileEntry, FileVersionGroup, VersionExcerpt,
    UnificationSuggestion, UnificationPreview,
};
pub use commit::{
    BranchHead, TreeEntry, TreeEntryKind, NewTreeEntry, NewPullRequest,
    PullRequest, CommitFile, CommitPlan, CommitOutcome, BLOB_MODE,
};
