use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a release run.
#[derive(Debug, Error)]
pub enum PushError {
    /// E2000: Missing or malformed command arguments.
    #[error("E2000: {0}")]
    Usage(String),

    /// E2001: A selector was given but no recipes/environments file exists.
    #[error("E2001: no recipes or environments file found in {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// E2002: The selector is not declared in the configuration file.
    #[error("E2002: '{selector}' not found in {}", file.display())]
    SelectorNotFound { selector: String, file: PathBuf },

    /// E2003: The selected entry is not a mapping.
    #[error("E2003: '{selector}' in {} is not an object", file.display())]
    InvalidSelectorType { selector: String, file: PathBuf },

    /// E2004: A configuration or settings file could not be read or parsed.
    #[error("E2004: {0}")]
    ConfigParse(String),

    /// E2010: The project has no root api spec.
    #[error("E2010: api {namespace} not found (no api spec in {})", folder.display())]
    ApiSpecNotFound { namespace: String, folder: PathBuf },

    /// E2011: The external build tool produced no output folder.
    #[error("E2011: build output not found in {}", .0.display())]
    MissingBuildOutput(PathBuf),

    /// E2012: The external build tool produced more than one candidate folder.
    #[error("E2012: ambiguous build output in {}: {}", folder.display(), candidates.join(", "))]
    AmbiguousBuildOutput {
        folder: PathBuf,
        candidates: Vec<String>,
    },

    /// E2020: The final namespace contains forbidden characters or is empty.
    #[error("E2020: invalid api namespace '{0}'. It should contain only letters, numbers, underscore ( _ ) and dash ( - )")]
    InvalidNamespace(String),

    /// E2032: Verb fan-out would overwrite another service spec.
    #[error("E2032: fanning out {} would overwrite {}", service.display(), target.display())]
    ServiceCollision { service: PathBuf, target: PathBuf },

    /// E2040: An external command could not be launched or exited non-zero.
    #[error("E2040: command `{command}` failed: {reason}")]
    ExternalCommand { command: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PushError {
    /// Attach a path to an I/O failure so the user knows which file broke.
    pub(crate) fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        PushError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

/// Non-fatal diagnostic recorded during a release run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushWarning {
    /// Warning code (e.g. "W2030").
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// File the warning refers to, if any.
    pub location: Option<String>,
}

impl PushWarning {
    /// W2030: a service references a function file that does not exist.
    pub fn missing_function_file(service: &std::path::Path, function: &std::path::Path) -> Self {
        Self {
            code: "W2030".to_string(),
            message: format!(
                "service spec uses function file {} which is not found",
                function.display()
            ),
            location: Some(service.display().to_string()),
        }
    }

    /// W2031: a service spec file could not be parsed and was skipped.
    pub fn service_parse(service: &std::path::Path, reason: impl fmt::Display) -> Self {
        Self {
            code: "W2031".to_string(),
            message: format!("skipped unreadable service spec: {}", reason),
            location: Some(service.display().to_string()),
        }
    }

    /// W2041: install was requested but no push command is configured.
    pub fn no_push_command(namespace: &str) -> Self {
        Self {
            code: "W2041".to_string(),
            message: format!("no push command configured, api {} was not installed", namespace),
            location: None,
        }
    }
}

impl fmt::Display for PushWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} [{}]: {}", self.code, loc, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}
