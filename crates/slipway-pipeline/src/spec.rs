//! Root api spec and YAML canonicalisation.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::error::PushError;
use crate::json::{is_yaml, load_document, store_json};

/// File name of the canonical root spec.
pub const API_SPEC_FILE: &str = "api.json";

/// Well-known spec keys.
pub mod keys {
    pub const NAME: &str = "name";
    pub const NAMESPACE: &str = "namespace";
    pub const RELEASE: &str = "release";
    pub const RUNTIME: &str = "runtime";
    pub const DATASOURCES: &str = "datasources";
    pub const DATA_MODELS: &str = "dataModels";

    pub const RELEASE_DATE: &str = "date";
    pub const RELEASE_VERSION: &str = "version";
    pub const RELEASE_PUSHED_BY: &str = "pushedBy";
    pub const RELEASE_NOTES: &str = "notes";
}

/// The root spec of an api. Unknown keys are kept in their original order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiSpec {
    doc: Map<String, Value>,
}

impl ApiSpec {
    pub fn from_map(doc: Map<String, Value>) -> Self {
        Self { doc }
    }

    /// Path of the canonical spec inside an api folder.
    pub fn path_in(folder: &Path) -> PathBuf {
        folder.join(API_SPEC_FILE)
    }

    /// Load `api.json` from an api folder.
    pub fn load(folder: &Path, namespace: &str) -> Result<Self, PushError> {
        let path = Self::path_in(folder);
        if !path.is_file() {
            return Err(PushError::ApiSpecNotFound {
                namespace: namespace.to_string(),
                folder: folder.to_path_buf(),
            });
        }
        match load_document(&path)? {
            Value::Object(doc) => Ok(Self { doc }),
            _ => Err(PushError::ConfigParse(format!(
                "{} must contain an object",
                path.display()
            ))),
        }
    }

    /// Write the spec back as `api.json`.
    pub fn store(&self, folder: &Path) -> Result<(), PushError> {
        store_json(&Value::Object(self.doc.clone()), &Self::path_in(folder))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.doc
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.doc)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field(keys::NAME)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.doc
            .insert(keys::NAME.to_string(), Value::String(name.into()));
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str_field(keys::NAMESPACE)
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.doc
            .insert(keys::NAMESPACE.to_string(), Value::String(namespace.into()));
    }

    /// The `release` block, created when missing or not an object.
    pub fn release_mut(&mut self) -> &mut Map<String, Value> {
        object_entry(&mut self.doc, keys::RELEASE)
    }

    pub fn runtime(&self) -> Option<&Map<String, Value>> {
        self.doc.get(keys::RUNTIME).and_then(Value::as_object)
    }

    /// The `runtime` block, created when missing or not an object.
    pub fn runtime_mut(&mut self) -> &mut Map<String, Value> {
        object_entry(&mut self.doc, keys::RUNTIME)
    }

    /// Declared data models, if any.
    pub fn data_models(&self) -> Option<&Value> {
        self.runtime()
            .and_then(|r| r.get(keys::DATA_MODELS))
            .filter(|v| !v.is_null())
    }
}

fn object_entry<'a>(doc: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = doc
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .expect("entry was just replaced by an object")
}

/// Convert every `*.yaml`/`*.yml` file under `folder` to a sibling `*.json`
/// and delete the source. Returns the converted files.
pub fn canonicalize_yaml(folder: &Path) -> Result<Vec<PathBuf>, PushError> {
    let yaml_files: Vec<PathBuf> = WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_yaml(e.path()))
        .map(|e| e.into_path())
        .collect();

    let mut converted = Vec::with_capacity(yaml_files.len());
    for source in yaml_files {
        let value = load_document(&source)?;
        let target = source.with_extension("json");
        store_json(&value, &target)?;
        std::fs::remove_file(&source).map_err(|e| PushError::io_at(&source, e))?;
        tracing::debug!(from = %source.display(), to = %target.display(), "Converted YAML spec");
        converted.push(target);
    }
    Ok(converted)
}
