//! Home-directory tool settings and user keys.
//!
//! Both files are optional and may be JSON or YAML:
//!
//! ```yaml
//! # <home>/settings.yaml
//! workspace: /home/me/apis
//! apis:
//!   shop: projects/shop-api
//! recipes:
//!   folder: /etc/slipway
//! push:
//!   command: "deployer install {folder}"
//! release:
//!   stamp: true
//!   notes: nightly
//! build:
//!   nocopy: false
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PushError;
use crate::json::{find_document, load_document};

/// Name of the settings file (without extension).
pub const SETTINGS_FILE: &str = "settings";
/// Name of the keys file (without extension).
pub const KEYS_FILE: &str = "keys";
/// Folder under the home directory where builds are assembled.
pub const BUILD_FOLDER: &str = "build";
/// Default workspace folder under the home directory.
pub const WORKSPACE_FOLDER: &str = "workspace";

/// Tool settings read from `<home>/settings.*`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder holding the api projects.
    pub workspace: Option<PathBuf>,
    /// Namespace to project path, relative to the workspace.
    pub apis: BTreeMap<String, String>,
    pub recipes: RecipesSettings,
    pub push: PushSettings,
    pub release: ReleaseSettings,
    pub build: BuildSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesSettings {
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    /// Install command line. Supports `{namespace}`, `{folder}` and `{build}`.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    /// Append the user stamp to the namespace.
    #[serde(deserialize_with = "de_flag")]
    pub stamp: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    #[serde(deserialize_with = "de_flag")]
    pub nocopy: bool,
}

impl Settings {
    /// Load settings from the home directory. A missing file yields defaults.
    pub fn load(home: &Path) -> Result<Self, PushError> {
        load_optional(home, SETTINGS_FILE)
    }

    /// Workspace folder, defaulting to `<home>/workspace`.
    pub fn workspace_dir(&self, home: &Path) -> PathBuf {
        match &self.workspace {
            Some(ws) if ws.is_absolute() => ws.clone(),
            Some(ws) => home.join(ws),
            None => home.join(WORKSPACE_FOLDER),
        }
    }

    /// Source folder of an api: the alias when declared, else the namespace.
    pub fn source_for(&self, workspace: &Path, namespace: &str) -> PathBuf {
        let relative = self
            .apis
            .get(namespace)
            .map(String::as_str)
            .unwrap_or(namespace);
        workspace.join(relative)
    }
}

/// The pushing user, read from `<home>/keys.*`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keys {
    pub user: UserKeys,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserKeys {
    pub id: Option<String>,
    pub stamp: Option<String>,
}

impl Keys {
    pub fn load(home: &Path) -> Result<Self, PushError> {
        load_optional(home, KEYS_FILE)
    }
}

fn load_optional<T>(home: &Path, stem: &str) -> Result<T, PushError>
where
    T: Default + serde::de::DeserializeOwned,
{
    let Some(path) = find_document(home, stem) else {
        return Ok(T::default());
    };
    let value = load_document(&path)?;
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value)
        .map_err(|e| PushError::ConfigParse(format!("invalid {}: {}", path.display(), e)))
}

/// Accept `true`, `false`, `"true"` and `"false"`.
fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Flag::Bool(b)) => Ok(b),
        Some(Flag::Text(s)) => Ok(s.trim().eq_ignore_ascii_case("true")),
    }
}
