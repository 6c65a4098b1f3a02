//! Reconciliation results.
//!
//! Suggestions are the decision set produced by the reconciliation engine.
//! They are plain data: the harmonized manifest builder consumes them and the
//! service layer serializes them unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The value one module declares for a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleValue {
    /// Module name.
    pub module: String,
    /// Declared value.
    pub value: String,
}

/// Classification of one script or dependency key across all modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Suggestion {
    /// Every module holding the key agrees on one value.
    #[serde(rename_all = "camelCase")]
    Uniform {
        /// Script name or (namespaced) dependency name.
        key: String,
        /// The single value.
        value: String,
        /// Contributing modules in collection order.
        modules: Vec<ModuleValue>,
    },
    /// Modules disagree; `recommended_value` is the chosen winner.
    #[serde(rename_all = "camelCase")]
    Decision {
        /// Script name or (namespaced) dependency name.
        key: String,
        /// Value to write back into every module holding the key.
        recommended_value: String,
        /// Number of modules using each distinct value.
        variant_counts: BTreeMap<String, usize>,
        /// Contributing modules in collection order.
        modules: Vec<ModuleValue>,
    },
}

impl Suggestion {
    /// The key this suggestion is about.
    pub fn key(&self) -> &str {
        match self {
            Self::Uniform { key, .. } | Self::Decision { key, .. } => key,
        }
    }

    /// Contributing modules.
    pub fn modules(&self) -> &[ModuleValue] {
        match self {
            Self::Uniform { modules, .. } | Self::Decision { modules, .. } => modules,
        }
    }

    /// True for `Decision`.
    pub fn needs_decision(&self) -> bool {
        matches!(self, Self::Decision { .. })
    }

    /// The value every module should end up with.
    pub fn target_value(&self) -> &str {
        match self {
            Self::Uniform { value, .. } => value,
            Self::Decision {
                recommended_value, ..
            } => recommended_value,
        }
    }
}

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    /// Modules collected (including degraded ones).
    pub module_count: usize,
    /// Distinct script keys.
    pub script_keys: usize,
    /// Distinct dependency keys (runtime and dev counted separately).
    pub dependency_keys: usize,
    /// Script keys needing a decision.
    pub script_decisions: usize,
    /// Dependency keys needing a decision.
    pub dependency_decisions: usize,
    /// xxh64 of the canonical decision set.
    pub fingerprint: String,
}

/// Full output of `reconcile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// One suggestion per script key, in first-seen order.
    pub script_suggestions: Vec<Suggestion>,
    /// One suggestion per dependency key, in first-seen order.
    pub dependency_suggestions: Vec<Suggestion>,
    /// Counts.
    pub summary: ReconciliationSummary,
}

impl Reconciliation {
    /// Script decisions only.
    pub fn script_decisions(&self) -> impl Iterator<Item = &Suggestion> {
        self.script_suggestions.iter().filter(|s| s.needs_decision())
    }

    /// Dependency decisions only.
    pub fn dependency_decisions(&self) -> impl Iterator<Item = &Suggestion> {
        self.dependency_suggestions
            .iter()
            .filter(|s| s.needs_decision())
    }

    /// Both suggestion lists, grouped for responses.
    pub fn suggestion_sets(&self) -> SuggestionSets {
        SuggestionSets {
            scripts: self.script_suggestions.clone(),
            dependencies: self.dependency_suggestions.clone(),
        }
    }
}

/// Suggestions as exposed on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSets {
    /// Script suggestions.
    pub scripts: Vec<Suggestion>,
    /// Dependency suggestions.
    pub dependencies: Vec<Suggestion>,
}
