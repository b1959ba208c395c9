//! Recipe and environment resolution.
//!
//! A configuration file maps ids to configuration blocks. The reserved key
//! `common` holds defaults shared by every id. Resolving an id produces an
//! [`EffectiveConfig`]: a duplicate of `common` with the selected block merged
//! on top.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PushError;
use crate::json::{self, find_document, merge_objects};
use crate::overrides::OverrideRule;

/// Reserved id for the shared defaults block.
pub const COMMON: &str = "common";

/// Which kind of configuration file was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Recipe,
    Environment,
}

impl ConfigKind {
    /// File stem searched for this kind.
    pub fn file_stem(self) -> &'static str {
        match self {
            ConfigKind::Recipe => "recipes",
            ConfigKind::Environment => "environments",
        }
    }

    /// Name under which the effective config is bound for templates.
    pub fn binding(self) -> &'static str {
        match self {
            ConfigKind::Recipe => "Recipe",
            ConfigKind::Environment => "Env",
        }
    }
}

/// A located configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub kind: ConfigKind,
    pub path: PathBuf,
}

/// Merged configuration for one release.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EffectiveConfig(Map<String, Value>);

impl EffectiveConfig {
    /// Wrap an already merged object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The config as a JSON value, for template bindings.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Look up a dotted key. A literal flat key (`"build.nocopy"`) wins over
    /// the nested path.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(key) {
            return Some(value);
        }
        let mut parts = key.split('.');
        let first = parts.next()?;
        let rest: Vec<&str> = parts.collect();
        json::find(self.0.get(first)?, &rest)
    }

    /// String value of a dotted key.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.lookup(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean value of a dotted key. Accepts `true`/`false` strings.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.lookup(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Object value of a dotted key.
    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.lookup(key).and_then(Value::as_object)
    }

    pub fn version(&self) -> Option<String> {
        self.string("version").filter(|v| !v.is_empty())
    }

    pub fn notes(&self) -> Option<String> {
        self.string("notes")
    }

    /// Endpoint prefix applied to every service.
    pub fn api_prefix(&self) -> Option<String> {
        self.string("api.prefix").filter(|p| !p.is_empty())
    }

    /// The `api` block without `prefix`, merged onto the root spec.
    pub fn api_overrides(&self) -> Option<Map<String, Value>> {
        let mut api = self.object("api")?.clone();
        api.remove("prefix");
        Some(api)
    }

    /// The `release` block merged onto the spec's release metadata.
    pub fn release_overrides(&self) -> Option<&Map<String, Value>> {
        self.object("release")
    }

    /// Per-service override rules, in declaration order.
    pub fn override_rules(&self) -> Result<Vec<OverrideRule>, PushError> {
        match self.lookup("services") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(rules)) => rules.iter().map(OverrideRule::from_value).collect(),
            Some(_) => Err(PushError::ConfigParse(
                "'services' must be a list of override rules".to_string(),
            )),
        }
    }

    pub fn nocopy(&self) -> bool {
        self.flag("build.nocopy").unwrap_or(false)
    }

    /// Relative paths removed from the build folder after copy.
    pub fn excludes(&self) -> Vec<String> {
        string_list(self.lookup("build.exclude"))
    }

    pub fn build_tool(&self) -> String {
        self.string("build.tool")
            .unwrap_or_else(|| DEFAULT_BUILD_TOOL.to_string())
    }

    pub fn build_marker(&self) -> String {
        self.string("build.marker")
            .unwrap_or_else(|| DEFAULT_BUILD_MARKER.to_string())
    }

    pub fn build_output(&self) -> String {
        self.string("build.output")
            .unwrap_or_else(|| DEFAULT_BUILD_OUTPUT.to_string())
    }

    /// Command line of the datasource generator, if any.
    pub fn generator(&self) -> Option<String> {
        self.string("build.generator").filter(|g| !g.trim().is_empty())
    }

    pub fn install(&self) -> bool {
        self.flag("install").unwrap_or(true)
    }

    pub fn copy_to(&self) -> Option<PathBuf> {
        self.string("copyTo")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Post-build commands grouped by working directory, in file order.
    pub fn run_commands(&self) -> Vec<(String, Vec<String>)> {
        self.object("run")
            .map(|run| {
                run.iter()
                    .map(|(dir, cmds)| (dir.clone(), string_list(Some(cmds))))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `user.id` fallback for the pusher identity.
    pub fn user_id(&self) -> Option<String> {
        self.string("user.id")
    }

    pub fn user_stamp(&self) -> Option<String> {
        self.string("user.stamp")
    }
}

/// Default external build command.
pub const DEFAULT_BUILD_TOOL: &str = "mvn clean install";
/// File whose presence triggers the external build.
pub const DEFAULT_BUILD_MARKER: &str = "pom.xml";
/// Folder the external build writes its output to.
pub const DEFAULT_BUILD_OUTPUT: &str = "target";

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Result of resolving a selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// The file that was read, if any.
    pub source: Option<ConfigSource>,
    /// The selector that was resolved.
    pub selector: Option<String>,
    pub effective: EffectiveConfig,
}

impl ResolvedConfig {
    /// Binding name for templates. Defaults to `Recipe` when no file exists.
    pub fn binding(&self) -> &'static str {
        self.source
            .as_ref()
            .map(|s| s.kind.binding())
            .unwrap_or(ConfigKind::Recipe.binding())
    }
}

/// Locates and resolves recipe/environment configuration.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    home: PathBuf,
    recipes_folder: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            recipes_folder: None,
        }
    }

    /// Search the recipes file in another folder than the home directory.
    pub fn with_recipes_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.recipes_folder = folder;
        self
    }

    /// Find the configuration file. Recipes win over environments.
    pub fn locate(&self) -> Option<ConfigSource> {
        let recipes_dir = self.recipes_folder.as_deref().unwrap_or(&self.home);
        if let Some(path) = find_document(recipes_dir, ConfigKind::Recipe.file_stem()) {
            return Some(ConfigSource {
                kind: ConfigKind::Recipe,
                path,
            });
        }
        find_document(&self.home, ConfigKind::Environment.file_stem()).map(|path| ConfigSource {
            kind: ConfigKind::Environment,
            path,
        })
    }

    /// Resolve a selector into an effective configuration.
    pub fn resolve(&self, selector: Option<&str>) -> Result<ResolvedConfig, PushError> {
        let selector = selector.filter(|s| !s.is_empty());

        let Some(source) = self.locate() else {
            if selector.is_some() {
                return Err(PushError::ConfigNotFound(self.home.clone()));
            }
            return Ok(ResolvedConfig {
                source: None,
                selector: None,
                effective: EffectiveConfig::default(),
            });
        };

        let loaded = json::load_document(&source.path)?;
        let effective = select(&loaded, selector, &source.path)?;

        tracing::debug!(
            file = %source.path.display(),
            selector = selector.unwrap_or(COMMON),
            keys = effective.as_map().len(),
            "Resolved configuration"
        );

        Ok(ResolvedConfig {
            source: Some(source),
            selector: selector.map(str::to_string),
            effective,
        })
    }
}

/// Merge `common` and the selected block of an already loaded document.
///
/// `loaded` is only read; the result is built from duplicates.
pub fn select(
    loaded: &Value,
    selector: Option<&str>,
    file: &Path,
) -> Result<EffectiveConfig, PushError> {
    let Value::Object(root) = loaded else {
        return Err(PushError::ConfigParse(format!(
            "{} must contain a mapping of ids",
            file.display()
        )));
    };

    let mut effective = match root.get(COMMON) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(common)) => common.clone(),
        Some(_) => {
            return Err(PushError::InvalidSelectorType {
                selector: COMMON.to_string(),
                file: file.to_path_buf(),
            })
        }
    };

    if let Some(selector) = selector {
        match root.get(selector) {
            None => {
                return Err(PushError::SelectorNotFound {
                    selector: selector.to_string(),
                    file: file.to_path_buf(),
                })
            }
            Some(Value::Null) => {}
            Some(Value::Object(target)) => merge_objects(&mut effective, target),
            Some(_) => {
                return Err(PushError::InvalidSelectorType {
                    selector: selector.to_string(),
                    file: file.to_path_buf(),
                })
            }
        }
    }

    Ok(EffectiveConfig(effective))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn resolve(home: &Path, selector: Option<&str>) -> Result<ResolvedConfig, PushError> {
        ConfigResolver::new(home).resolve(selector)
    }

    #[test]
    fn no_file_and_no_selector_is_empty() {
        let temp = TempDir::new().unwrap();
        let resolved = resolve(temp.path(), None).unwrap();
        assert!(resolved.effective.is_empty());
        assert!(resolved.source.is_none());
        assert_eq!(resolved.binding(), "Recipe");
    }

    #[test]
    fn selector_without_file_fails() {
        let temp = TempDir::new().unwrap();
        let err = resolve(temp.path(), Some("prod")).unwrap_err();
        assert!(matches!(err, PushError::ConfigNotFound(_)));
        assert!(err.to_string().starts_with("E2001"));
    }

    #[test]
    fn unknown_selector_fails() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "recipes.json", r#"{"dev": {}}"#);
        let err = resolve(temp.path(), Some("prod")).unwrap_err();
        assert!(matches!(err, PushError::SelectorNotFound { ref selector, .. } if selector == "prod"));
    }

    #[test]
    fn non_mapping_selector_fails() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "recipes.json", r#"{"prod": "oops"}"#);
        let err = resolve(temp.path(), Some("prod")).unwrap_err();
        assert!(matches!(err, PushError::InvalidSelectorType { .. }));
    }

    #[test]
    fn target_wins_over_common() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "recipes.json",
            r#"{"common": {"version": "1.0", "notes": "shared"}, "target": {"version": "2.0"}}"#,
        );
        let effective = resolve(temp.path(), Some("target")).unwrap().effective;
        assert_eq!(effective.version().as_deref(), Some("2.0"));
        assert_eq!(effective.notes().as_deref(), Some("shared"));
    }

    #[test]
    fn nested_blocks_are_merged() {
        let loaded = json!({
            "common": {"build": {"nocopy": false, "exclude": ["docs"]}},
            "fast": {"build": {"nocopy": true}}
        });
        let effective = select(&loaded, Some("fast"), Path::new("recipes.json")).unwrap();
        assert!(effective.nocopy());
        assert_eq!(effective.excludes(), vec!["docs".to_string()]);
    }

    #[test]
    fn common_only_is_a_duplicate() {
        let loaded = json!({"common": {"version": "beta"}, "target": null});
        let before = loaded.clone();

        let effective = select(&loaded, None, Path::new("recipes.json")).unwrap();
        assert_eq!(effective.to_value(), json!({"version": "beta"}));
        assert_eq!(loaded, before);
    }

    #[test]
    fn null_target_means_no_block() {
        let loaded = json!({"common": {"version": "beta"}, "target": null});
        let effective = select(&loaded, Some("target"), Path::new("recipes.json")).unwrap();
        assert_eq!(effective.to_value(), json!({"version": "beta"}));
    }

    #[test]
    fn resolve_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "environments.yaml",
            "common:\n  api:\n    prefix: /v1\nprod:\n  install: false\n",
        );
        let resolver = ConfigResolver::new(temp.path());
        let first = resolver.resolve(Some("prod")).unwrap();
        let second = resolver.resolve(Some("prod")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.binding(), "Env");
        assert!(!first.effective.install());
        assert_eq!(first.effective.api_prefix().as_deref(), Some("/v1"));
    }

    #[test]
    fn recipes_win_over_environments() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "environments.json", r#"{"prod": {"version": "env"}}"#);
        write(temp.path(), "recipes.yml", "prod:\n  version: recipe\n");
        let resolved = resolve(temp.path(), Some("prod")).unwrap();
        assert_eq!(resolved.binding(), "Recipe");
        assert_eq!(resolved.effective.version().as_deref(), Some("recipe"));
    }

    #[test]
    fn recipes_folder_is_honoured() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("shared");
        std::fs::create_dir(&folder).unwrap();
        write(&folder, "recipes.json", r#"{"prod": {"version": "3"}}"#);

        let resolved = ConfigResolver::new(temp.path())
            .with_recipes_folder(Some(folder))
            .resolve(Some("prod"))
            .unwrap();
        assert_eq!(resolved.effective.version().as_deref(), Some("3"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "recipes.json", "{not json");
        let err = resolve(temp.path(), None).unwrap_err();
        assert!(matches!(err, PushError::ConfigParse(_)));
    }

    #[test]
    fn accessors_have_defaults() {
        let effective = EffectiveConfig::default();
        assert!(effective.install());
        assert!(!effective.nocopy());
        assert_eq!(effective.build_tool(), "mvn clean install");
        assert_eq!(effective.build_marker(), "pom.xml");
        assert_eq!(effective.build_output(), "target");
        assert!(effective.generator().is_none());
        assert!(effective.run_commands().is_empty());
    }

    #[test]
    fn flat_dotted_keys_are_accepted() {
        let effective = EffectiveConfig::from_map(
            json!({"build.nocopy": "true", "api": {"prefix": "/v2", "vendor": "acme"}})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert!(effective.nocopy());
        let api = effective.api_overrides().unwrap();
        assert!(api.get("prefix").is_none());
        assert_eq!(api.get("vendor"), Some(&json!("acme")));
    }

    #[test]
    fn run_commands_keep_file_order() {
        let loaded = json!({"common": {"run": {"b": ["one"], "a": ["two", "three"]}}});
        let effective = select(&loaded, None, Path::new("recipes.json")).unwrap();
        let run = effective.run_commands();
        assert_eq!(run[0].0, "b");
        assert_eq!(run[1].1, vec!["two".to_string(), "three".to_string()]);
    }
}
