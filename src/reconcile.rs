//! Cross-module reconciliation.
//!
//! Folds every module's scripts and dependencies into ordered cross-module
//! value maps and classifies each key as uniform or needing a decision.
//!
//! ## Ordering
//!
//! Ties are broken by first appearance, so the maps never rely on hash
//! iteration order. Every contribution carries a global sequence number
//! assigned while walking modules in collection order, and keys keep the
//! order in which they were first met.
//!
//! ## Recommendation rules
//!
//! - Scripts: the most common value wins; equal counts go to the value seen
//!   first.
//! - Dependencies: the highest `(major, minor, patch)` wins regardless of
//!   frequency; equal tuples go to the value seen first. Unparsable
//!   specifiers rank as `0.0.0`.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::canonical::canonical_hash_hex;
use crate::types::{
    DependencyScope, Module, ModuleValue, Reconciliation, ReconciliationSummary, Suggestion,
};
use crate::version;

/// One module's value for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    /// Module name.
    pub module: String,
    /// Declared value.
    pub value: String,
    /// Global position in the fold.
    pub seen: usize,
}

#[derive(Debug, Clone)]
struct KeyRecord {
    key: String,
    contributions: Vec<Contribution>,
}

/// Key → per-module values, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CrossModuleValueMap {
    records: Vec<KeyRecord>,
    index: HashMap<String, usize>,
    next_seen: usize,
}

impl CrossModuleValueMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every module's scripts.
    pub fn scripts(modules: &[Module]) -> Self {
        let mut map = Self::new();
        for module in modules {
            if let Some(manifest) = &module.manifest {
                for (key, value) in manifest.scripts() {
                    map.insert(key, &module.name, value);
                }
            }
        }
        map
    }

    /// Fold every module's runtime then dev dependencies, dev keys namespaced.
    pub fn dependencies(modules: &[Module]) -> Self {
        let mut map = Self::new();
        for module in modules {
            if let Some(manifest) = &module.manifest {
                for scope in [DependencyScope::Runtime, DependencyScope::Dev] {
                    for (name, value) in manifest.dependencies(scope) {
                        map.insert(&scope.namespaced(name), &module.name, value);
                    }
                }
            }
        }
        map
    }

    /// Record one contribution.
    pub fn insert(&mut self, key: &str, module: &str, value: &str) {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.records.push(KeyRecord {
                    key: key.to_string(),
                    contributions: Vec::new(),
                });
                self.index.insert(key.to_string(), self.records.len() - 1);
                self.records.len() - 1
            }
        };
        self.records[slot].contributions.push(Contribution {
            module: module.to_string(),
            value: value.to_string(),
            seen: self.next_seen,
        });
        self.next_seen += 1;
    }

    /// Contributions for one key.
    pub fn get(&self, key: &str) -> Option<&[Contribution]> {
        self.index
            .get(key)
            .map(|&slot| self.records[slot].contributions.as_slice())
    }

    /// Keys with their contributions, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Contribution])> {
        self.records
            .iter()
            .map(|r| (r.key.as_str(), r.contributions.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no module contributed anything.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How a conflicting key picks its recommended value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    /// Highest count, first seen on ties.
    MostCommon,
    /// Highest version tuple, first seen on ties.
    HighestVersion,
}

/// A distinct value with its count and first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// The value.
    pub value: String,
    /// Modules using it.
    pub count: usize,
    /// Sequence number of its first contribution.
    pub first_seen: usize,
}

/// Distinct values of a key in first-seen order.
pub fn variants(contributions: &[Contribution]) -> Vec<Variant> {
    let mut ordered: Vec<Variant> = Vec::new();
    for contribution in contributions {
        match ordered.iter_mut().find(|v| v.value == contribution.value) {
            Some(variant) => {
                variant.count += 1;
                variant.first_seen = variant.first_seen.min(contribution.seen);
            }
            None => ordered.push(Variant {
                value: contribution.value.clone(),
                count: 1,
                first_seen: contribution.seen,
            }),
        }
    }
    ordered.sort_by_key(|v| v.first_seen);
    ordered
}

/// Pick the recommended value among variants given in first-seen order.
pub fn recommend(variants: &[Variant], rule: Recommendation) -> Option<&str> {
    match rule {
        Recommendation::MostCommon => {
            let mut ranked: Vec<&Variant> = variants.iter().collect();
            // stable: equal counts stay in first-seen order
            ranked.sort_by(|a, b| b.count.cmp(&a.count));
            ranked.first().map(|v| v.value.as_str())
        }
        Recommendation::HighestVersion => version::highest(variants.iter().map(|v| v.value.as_str())),
    }
}

/// Classify one key.
pub fn classify(key: &str, contributions: &[Contribution], rule: Recommendation) -> Suggestion {
    let modules: Vec<ModuleValue> = contributions
        .iter()
        .map(|c| ModuleValue {
            module: c.module.clone(),
            value: c.value.clone(),
        })
        .collect();
    let variants = variants(contributions);

    if variants.len() == 1 {
        return Suggestion::Uniform {
            key: key.to_string(),
            value: variants[0].value.clone(),
            modules,
        };
    }

    let recommended_value = recommend(&variants, rule).unwrap_or_default().to_string();
    let variant_counts: BTreeMap<String, usize> = variants
        .iter()
        .map(|v| (v.value.clone(), v.count))
        .collect();

    Suggestion::Decision {
        key: key.to_string(),
        recommended_value,
        variant_counts,
        modules,
    }
}

/// Classify every key of a map.
pub fn suggestions(map: &CrossModuleValueMap, rule: Recommendation) -> Vec<Suggestion> {
    map.iter()
        .map(|(key, contributions)| classify(key, contributions, rule))
        .collect()
}

/// Reconcile a collected module set.
///
/// Pure: the same modules in the same order always produce the same result,
/// including the fingerprint.
pub fn reconcile(modules: &[Module]) -> Reconciliation {
    let scripts = CrossModuleValueMap::scripts(modules);
    let dependencies = CrossModuleValueMap::dependencies(modules);

    let script_suggestions = suggestions(&scripts, Recommendation::MostCommon);
    let dependency_suggestions = suggestions(&dependencies, Recommendation::HighestVersion);

    let summary = ReconciliationSummary {
        module_count: modules.len(),
        script_keys: scripts.len(),
        dependency_keys: dependencies.len(),
        script_decisions: script_suggestions.iter().filter(|s| s.needs_decision()).count(),
        dependency_decisions: dependency_suggestions
            .iter()
            .filter(|s| s.needs_decision())
            .count(),
        fingerprint: canonical_hash_hex(&(&script_suggestions, &dependency_suggestions)),
    };

    debug!(
        modules = summary.module_count,
        script_keys = summary.script_keys,
        dependency_keys = summary.dependency_keys,
        script_decisions = summary.script_decisions,
        dependency_decisions = summary.dependency_decisions,
        "Reconciliation complete"
    );

    Reconciliation {
        script_suggestions,
        dependency_suggestions,
        summary,
    }
}
