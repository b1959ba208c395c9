//! TestProject: a tool home in a temp directory.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use thiserror::Error;

use slipway_pipeline::assemble::copy_tree;
use slipway_pipeline::{push_api, PushError, PushRequest, ReleaseReport, SystemRunner};

/// Fixture home shipped with the workspace: settings, keys, recipes and the
/// `petstore` api project.
pub const PETSTORE_HOME: &str = "home";

/// Errors from TestProject operations.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("push failed: {0}")]
    Push(#[from] PushError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("fixture not found: {0}")]
    FixtureNotFound(PathBuf),
}

/// Absolute path to the shared test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    // CARGO_MANIFEST_DIR = .../crates/slipway-test
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("tests/fixtures")
}

/// A tool home seeded from a fixture folder.
///
/// The directory is deleted when the project is dropped.
pub struct TestProject {
    home: TempDir,
}

impl TestProject {
    /// Copy `tests/fixtures/<name>` into a fresh temp home.
    pub fn from_fixture(name: &str) -> Result<Self, TestError> {
        let source = fixtures_dir().join(name);
        if !source.is_dir() {
            return Err(TestError::FixtureNotFound(source));
        }
        let home = TempDir::new()?;
        copy_tree(&source, home.path())?;
        Ok(Self { home })
    }

    /// The petstore home.
    pub fn petstore() -> Result<Self, TestError> {
        Self::from_fixture(PETSTORE_HOME)
    }

    pub fn home(&self) -> &Path {
        self.home.path()
    }

    /// Folder under the home where builds are assembled.
    pub fn build_dir(&self) -> PathBuf {
        self.home().join(slipway_pipeline::settings::BUILD_FOLDER)
    }

    /// Write a file relative to the home, creating parent folders.
    pub fn write(&self, rel: &str, content: &str) -> Result<(), TestError> {
        let path = self.home().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read a JSON file relative to the home.
    pub fn read_json(&self, rel: &str) -> Result<Value, TestError> {
        let path = self.home().join(rel);
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|source| TestError::Json { path, source })
    }

    /// A push request against this home.
    pub fn request(&self, namespace: &str) -> PushRequest {
        PushRequest::new(self.home(), namespace)
    }

    /// Run a release with real external commands.
    pub fn push(&self, request: &PushRequest) -> Result<ReleaseReport, TestError> {
        Ok(push_api(request, &SystemRunner)?)
    }
}
