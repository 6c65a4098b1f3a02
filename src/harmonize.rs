//! Harmonized manifest construction.
//!
//! Writes decisions back into copies of each module's manifest.
//!
//! - Script decisions are written into every module, creating the script
//!   when the module lacks it.
//! - Dependency decisions are written only where the module already declares
//!   that dependency in the same scope (`dependencies` or `devDependencies`).
//!   A dependency is never introduced into a module that did not have it.
//!
//! Uniform suggestions are no-ops and are skipped.

use crate::types::{CommitPlan, DependencyScope, Manifest, Module, Suggestion, SCRIPTS};

/// A module's manifest after decisions were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedManifest {
    /// Manifest path.
    pub path: String,
    /// Module name.
    pub module: String,
    /// Rewritten manifest.
    pub manifest: Manifest,
    /// Whether the module had a parsed manifest to begin with.
    pub had_manifest: bool,
    /// Whether any value differs from the original.
    pub changed: bool,
}

/// Apply decisions to every module. Output follows module order.
pub fn harmonize(
    modules: &[Module],
    script_suggestions: &[Suggestion],
    dependency_suggestions: &[Suggestion],
) -> Vec<HarmonizedManifest> {
    modules
        .iter()
        .map(|module| harmonize_module(module, script_suggestions, dependency_suggestions))
        .collect()
}

fn harmonize_module(
    module: &Module,
    script_suggestions: &[Suggestion],
    dependency_suggestions: &[Suggestion],
) -> HarmonizedManifest {
    let original = module.manifest.clone().unwrap_or_default();
    let mut manifest = original.clone();

    for suggestion in script_suggestions.iter().filter(|s| s.needs_decision()) {
        manifest.set_entry(SCRIPTS, suggestion.key(), suggestion.target_value());
    }

    for suggestion in dependency_suggestions.iter().filter(|s| s.needs_decision()) {
        let (scope, name) = DependencyScope::split_key(suggestion.key());
        if manifest.has_entry(scope.section(), name) {
            manifest.set_entry(scope.section(), name, suggestion.target_value());
        }
    }

    HarmonizedManifest {
        path: module.path.clone(),
        module: module.name.clone(),
        changed: manifest != original,
        had_manifest: module.manifest.is_some(),
        manifest,
    }
}

/// Commit plan for the manifests worth writing.
///
/// Unchanged manifests are left out, and so are modules whose original
/// manifest was unreadable: overwriting those with a rebuilt shell would
/// destroy whatever the file contained.
pub fn commit_plan(harmonized: &[HarmonizedManifest]) -> CommitPlan {
    let mut plan = CommitPlan::new();
    for entry in harmonized.iter().filter(|h| h.changed && h.had_manifest) {
        plan.push(entry.path.clone(), entry.manifest.render());
    }
    plan
}
