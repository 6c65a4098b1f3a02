//! Module and manifest types.
//!
//! A module is one package of the monorepo, identified by the location of its
//! `package.json`. The manifest itself is kept as an opaque JSON document so
//! that harmonization rewrites only the sub-maps it understands and leaves
//! every other field (and its key order) untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the manifest file that identifies a module.
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Sub-map holding script commands.
pub const SCRIPTS: &str = "scripts";
/// Sub-map holding runtime dependencies.
pub const DEPENDENCIES: &str = "dependencies";
/// Sub-map holding development dependencies.
pub const DEV_DEPENDENCIES: &str = "devDependencies";

/// Coarse classification of a module by where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Deployable application (`apps/...`).
    App,
    /// Shared library package (`packages/...`).
    Package,
    /// Anything else.
    Unknown,
}

impl ModuleKind {
    /// Classify a repository-relative manifest path by its first segment.
    pub fn from_path(path: &str) -> Self {
        match path.split('/').next() {
            Some("apps") => Self::App,
            Some("packages") => Self::Package,
            _ => Self::Unknown,
        }
    }
}

impl Default for ModuleKind {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Package => write!(f, "package"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Dependency scope a key was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    /// `dependencies`
    Runtime,
    /// `devDependencies`
    Dev,
}

impl DependencyScope {
    /// Prefix used to namespace dev-dependency keys in the cross-module map.
    pub const DEV_PREFIX: &'static str = "dev:";

    /// Manifest sub-map backing this scope.
    pub fn section(self) -> &'static str {
        match self {
            Self::Runtime => DEPENDENCIES,
            Self::Dev => DEV_DEPENDENCIES,
        }
    }

    /// Namespace a dependency name for this scope.
    pub fn namespaced(self, name: &str) -> String {
        match self {
            Self::Runtime => name.to_string(),
            Self::Dev => format!("{}{}", Self::DEV_PREFIX, name),
        }
    }

    /// Split a namespaced key back into its scope and bare dependency name.
    pub fn split_key(key: &str) -> (Self, &str) {
        match key.strip_prefix(Self::DEV_PREFIX) {
            Some(name) => (Self::Dev, name),
            None => (Self::Runtime, key),
        }
    }
}

/// Parsed `package.json` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    document: Map<String, Value>,
}

impl Manifest {
    /// Create an empty manifest shell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse manifest text. Anything other than a JSON object is rejected.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let document: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self { document })
    }

    /// Wrap an already-built JSON object.
    pub fn from_document(document: Map<String, Value>) -> Self {
        Self { document }
    }

    /// The full document.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Declared package name, if it is a non-empty string.
    pub fn name(&self) -> Option<&str> {
        self.document
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// String entries of a sub-map in document order.
    ///
    /// Non-string values are skipped; a missing or non-object section yields
    /// nothing.
    pub fn entries(&self, section: &str) -> Vec<(&str, &str)> {
        match self.document.get(section) {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|v| (key.as_str(), v)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Script entries.
    pub fn scripts(&self) -> Vec<(&str, &str)> {
        self.entries(SCRIPTS)
    }

    /// Dependency entries of one scope.
    pub fn dependencies(&self, scope: DependencyScope) -> Vec<(&str, &str)> {
        self.entries(scope.section())
    }

    /// Whether a sub-map declares `key`.
    pub fn has_entry(&self, section: &str, key: &str) -> bool {
        matches!(self.document.get(section), Some(Value::Object(map)) if map.contains_key(key))
    }

    /// Write `value` under `section.key`, creating the section if needed.
    ///
    /// A section that exists but is not an object is replaced.
    pub fn set_entry(&mut self, section: &str, key: &str, value: &str) {
        let slot = self
            .document
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// Render as two-space pretty JSON with a trailing newline.
    pub fn render(&self) -> String {
        let mut text = serde_json::to_string_pretty(&self.document)
            .unwrap_or_else(|_| String::from("{}"));
        text.push('\n');
        text
    }
}

/// One package of the monorepo.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Repository-relative path of the manifest.
    pub path: String,
    /// Declared name, or the parent directory name.
    pub name: String,
    /// Coarse kind derived from the path.
    pub kind: ModuleKind,
    /// Parsed manifest; `None` when it could not be read or parsed.
    pub manifest: Option<Manifest>,
}

impl Module {
    /// Build a module from a manifest location and its parse result.
    pub fn new(path: impl Into<String>, manifest: Option<Manifest>) -> Self {
        let path = path.into();
        let name = manifest
            .as_ref()
            .and_then(|m| m.name().map(str::to_string))
            .unwrap_or_else(|| directory_name(&path));
        let kind = ModuleKind::from_path(&path);
        Self {
            path,
            name,
            kind,
            manifest,
        }
    }

    /// Lightweight view for responses.
    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            path: self.path.clone(),
            name: self.name.clone(),
            kind: self.kind,
            has_manifest: self.manifest.is_some(),
        }
    }
}

/// Name of the directory containing a manifest path.
fn directory_name(path: &str) -> String {
    let mut segments = path.rsplit('/');
    segments.next();
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}

/// Serializable module listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    /// Manifest path.
    pub path: String,
    /// Module name.
    pub name: String,
    /// Module kind.
    pub kind: ModuleKind,
    /// False when the manifest was unreadable.
    pub has_manifest: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(ModuleKind::from_path("apps/web/package.json"), ModuleKind::App);
        assert_eq!(ModuleKind::from_path("packages/ui/package.json"), ModuleKind::Package);
        assert_eq!(ModuleKind::from_path("tools/x/package.json"), ModuleKind::Unknown);
    }

    #[test]
    fn test_name_falls_back_to_directory() {
        let module = Module::new("apps/web/package.json", None);
        assert_eq!(module.name, "web");
        assert_eq!(module.kind, ModuleKind::App);

        let manifest = Manifest::parse(r#"{"name": "@acme/web"}"#).unwrap();
        let module = Module::new("apps/web/package.json", Some(manifest));
        assert_eq!(module.name, "@acme/web");
    }

    #[test]
    fn test_empty_name_ignored() {
        let manifest = Manifest::parse(r#"{"name": ""}"#).unwrap();
        let module = Module::new("packages/ui/package.json", Some(manifest));
        assert_eq!(module.name, "ui");
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(Manifest::parse("[1, 2]").is_err());
        assert!(Manifest::parse("{not json").is_err());
    }

    #[test]
    fn test_entries_skip_non_strings() {
        let manifest = Manifest::parse(
            r#"{"scripts": {"build": "tsc", "weird": 3}, "dependencies": "nope"}"#,
        )
        .unwrap();
        assert_eq!(manifest.scripts(), vec![("build", "tsc")]);
        assert!(manifest.dependencies(DependencyScope::Runtime).is_empty());
    }

    #[test]
    fn test_set_entry_preserves_order() {
        let mut manifest = Manifest::parse(
            r#"{"name": "a", "scripts": {"lint": "eslint", "build": "tsc"}, "private": true}"#,
        )
        .unwrap();
        manifest.set_entry(SCRIPTS, "build", "vite build");
        let rendered = manifest.render();
        let name_at = rendered.find("\"name\"").unwrap();
        let lint_at = rendered.find("\"lint\"").unwrap();
        let build_at = rendered.find("\"build\"").unwrap();
        let private_at = rendered.find("\"private\"").unwrap();
        assert!(name_at < lint_at && lint_at < build_at && build_at < private_at);
        assert!(rendered.contains("\"vite build\""));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn test_dependency_scope_keys() {
        assert_eq!(DependencyScope::Dev.namespaced("react"), "dev:react");
        assert_eq!(DependencyScope::split_key("dev:react"), (DependencyScope::Dev, "react"));
        assert_eq!(DependencyScope::split_key("react"), (DependencyScope::Runtime, "react"));
    }
}
