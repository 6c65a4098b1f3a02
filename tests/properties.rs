//! Property-based tests for reconciliation and harmonization.

use monorepo_harmonizer::types::{DependencyScope, Manifest, Module};
use monorepo_harmonizer::version::VersionTuple;
use monorepo_harmonizer::{harmonize, reconcile, Suggestion};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

fn version_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["", "^", "~", ">=", "v", "workspace:"]),
        0u64..20,
        0u64..20,
        0u64..20,
    )
        .prop_map(|(lead, major, minor, patch)| format!("{lead}{major}.{minor}.{patch}"))
}

fn section_strategy(keys: &'static [&'static str], values: BoxedStrategy<String>) -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(prop::sample::select(keys.to_vec()), values, 0..keys.len())
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect()
        })
}

fn manifest_strategy() -> impl Strategy<Value = Manifest> {
    let scripts = section_strategy(
        &["build", "dev", "lint", "test"],
        prop::sample::select(vec!["tsc", "vite build", "vite", "eslint .", "vitest"])
            .prop_map(str::to_string)
            .boxed(),
    );
    let dependencies = section_strategy(&["react", "zod", "lodash"], version_strategy().boxed());
    let dev = section_strategy(&["typescript", "react", "vitest"], version_strategy().boxed());
    (scripts, dependencies, dev).prop_map(|(scripts, dependencies, dev)| {
        let mut document = Map::new();
        document.insert("scripts".to_string(), Value::Object(scripts));
        document.insert("dependencies".to_string(), Value::Object(dependencies));
        document.insert("devDependencies".to_string(), Value::Object(dev));
        Manifest::from_document(document)
    })
}

fn modules_strategy() -> impl Strategy<Value = Vec<Module>> {
    prop::collection::vec(manifest_strategy(), 1..6).prop_map(|manifests| {
        manifests
            .into_iter()
            .enumerate()
            .map(|(i, mut manifest)| {
                let name = format!("m{i}");
                let mut document = manifest.document().clone();
                document.insert("name".to_string(), json!(name));
                manifest = Manifest::from_document(document);
                Module::new(format!("apps/{name}/package.json"), Some(manifest))
            })
            .collect()
    })
}

fn harmonized_modules(modules: &[Module]) -> Vec<Module> {
    let plan = reconcile(modules);
    harmonize(modules, &plan.script_suggestions, &plan.dependency_suggestions)
        .into_iter()
        .map(|h| Module::new(h.path, Some(h.manifest)))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    /// Property: a script with one value everywhere is uniform
    #[test]
    fn shared_identical_script_is_uniform(count in 1usize..6, value in "[a-z ]{1,12}") {
        let modules: Vec<Module> = (0..count)
            .map(|i| {
                let manifest = Manifest::parse(&json!({"scripts": {"build": value}}).to_string()).unwrap();
                Module::new(format!("apps/m{i}/package.json"), Some(manifest))
            })
            .collect();
        let plan = reconcile(&modules);
        prop_assert_eq!(plan.script_suggestions.len(), 1);
        let is_uniform = matches!(&plan.script_suggestions[0], Suggestion::Uniform { value: v, .. } if *v == value);
        prop_assert!(is_uniform);
    }

    /// Property: a dependency decision recommends the highest tuple, first seen on ties
    #[test]
    fn dependency_decision_picks_highest_tuple(versions in prop::collection::vec(version_strategy(), 2..8)) {
        let modules: Vec<Module> = versions
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let manifest = Manifest::parse(&json!({"dependencies": {"react": v}}).to_string()).unwrap();
                Module::new(format!("apps/m{i}/package.json"), Some(manifest))
            })
            .collect();
        let plan = reconcile(&modules);
        let suggestion = &plan.dependency_suggestions[0];

        let distinct: std::collections::BTreeSet<&String> = versions.iter().collect();
        if distinct.len() == 1 {
            prop_assert!(!suggestion.needs_decision());
        } else {
            prop_assert!(suggestion.needs_decision());
            let best = versions.iter().map(|v| VersionTuple::parse(v)).max().unwrap();
            let expected = versions.iter().find(|v| VersionTuple::parse(v) == best).unwrap();
            prop_assert_eq!(suggestion.target_value(), expected.as_str());
        }
    }

    /// Property: reconciling a harmonized set leaves no decisions behind
    #[test]
    fn harmonization_is_idempotent(modules in modules_strategy()) {
        let first = reconcile(&modules);
        let harmonized = harmonized_modules(&modules);
        let second = reconcile(&harmonized);

        for decision in first.script_decisions().chain(first.dependency_decisions()) {
            let after = second
                .script_suggestions
                .iter()
                .chain(second.dependency_suggestions.iter())
                .find(|s| s.key() == decision.key())
                .unwrap();
            prop_assert!(!after.needs_decision());
            prop_assert_eq!(after.target_value(), decision.target_value());
        }
        prop_assert_eq!(second.summary.script_decisions, 0);
        prop_assert_eq!(second.summary.dependency_decisions, 0);
    }

    /// Property: harmonization never adds a dependency key a module lacked
    #[test]
    fn harmonization_adds_no_dependency_keys(modules in modules_strategy()) {
        let harmonized = harmonized_modules(&modules);
        for (before, after) in modules.iter().zip(&harmonized) {
            let before = before.manifest.as_ref().unwrap();
            let after = after.manifest.as_ref().unwrap();
            for scope in [DependencyScope::Runtime, DependencyScope::Dev] {
                let keys_before: Vec<&str> = before.dependencies(scope).iter().map(|(k, _)| *k).collect();
                let keys_after: Vec<&str> = after.dependencies(scope).iter().map(|(k, _)| *k).collect();
                prop_assert_eq!(keys_before, keys_after);
            }
        }
    }

    /// Property: reconciliation is deterministic
    #[test]
    fn reconciliation_is_deterministic(modules in modules_strategy()) {
        prop_assert_eq!(reconcile(&modules), reconcile(&modules));
    }
}
