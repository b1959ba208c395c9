//! The `push api` release run.
//!
//! [`push_api`] drives one run through every stage:
//!
//! ```text
//! ConfigResolved → SourceCopied → SpecStamped → NamespaceValidated
//!   → ServicesNormalized → Renamed → Published → CleanedUp
//! ```
//!
//! A failing stage aborts the run; nothing is rolled back. The build folder
//! is removed on every exit path unless `keep_build` is set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::assemble::{assemble, finalize, normalize_services, prepare_spec};
use crate::config::{ConfigResolver, ResolvedConfig};
use crate::context::{PipelineContext, PipelineOptions, ReleaseInfo, ReleaseStage};
use crate::error::{PushError, PushWarning};
use crate::external::CommandRunner;
use crate::marker::StorePolicy;
use crate::namespace;
use crate::publish::{publish, BuildFolderGuard};
use crate::settings::{Keys, Settings, BUILD_FOLDER};
use crate::template::Bindings;

/// What `push` operates on. Only apis can be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTarget {
    Api,
}

impl FromStr for PushTarget {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(PushTarget::Api),
            other => Err(PushError::Usage(format!(
                "wrong push target '{}'. eg. push api <namespace>",
                other
            ))),
        }
    }
}

impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushTarget::Api => f.write_str("api"),
        }
    }
}

/// Parsed `push` arguments: `api <namespace> [selector]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushArgs {
    pub target: PushTarget,
    pub namespace: String,
    pub selector: Option<String>,
}

impl PushArgs {
    /// Parse whitespace-separated `push` arguments.
    pub fn parse(command: &str) -> Result<Self, PushError> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(PushError::Usage(
                "missing command arguments. eg. push api <namespace> [recipe|environment]"
                    .to_string(),
            ));
        }
        Ok(Self {
            target: tokens[0].parse()?,
            namespace: tokens[1].to_string(),
            selector: tokens.get(2).map(|s| s.to_string()),
        })
    }
}

/// Inputs of one release run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    /// Tool home: settings, keys, recipes and the build folder.
    pub home: PathBuf,
    /// Overrides the workspace from settings.
    pub workspace: Option<PathBuf>,
    pub namespace: String,
    /// Recipe or environment id.
    pub selector: Option<String>,
    /// Overrides the configured `version`.
    pub version: Option<String>,
    /// Overrides the configured `notes`.
    pub notes: Option<String>,
    /// Overrides the push command from settings.
    pub push_command: Option<String>,
    pub no_install: bool,
    pub no_copy: bool,
    pub keep_build: bool,
    pub store_policy: StorePolicy,
}

impl PushRequest {
    pub fn new(home: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            workspace: None,
            namespace: namespace.into(),
            selector: None,
            version: None,
            notes: None,
            push_command: None,
            no_install: false,
            no_copy: false,
            keep_build: false,
            store_policy: StorePolicy::WhenFound,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_push_command(mut self, command: impl Into<String>) -> Self {
        self.push_command = Some(command.into());
        self
    }
}

/// Summary of a successful release run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Final api namespace.
    pub namespace: String,
    /// Final build folder. Already deleted unless `kept`.
    pub folder: PathBuf,
    pub kept: bool,
    /// Service spec files written.
    pub services: usize,
    pub markers: usize,
    pub pushed_with: Option<String>,
    pub copied_to: Option<PathBuf>,
    pub stages: Vec<ReleaseStage>,
    pub warnings: Vec<PushWarning>,
}

/// Resolve the configuration a push would use, honouring `recipes.folder`.
pub fn resolve_config(home: &Path, selector: Option<&str>) -> Result<ResolvedConfig, PushError> {
    let settings = Settings::load(home)?;
    ConfigResolver::new(home)
        .with_recipes_folder(settings.recipes.folder)
        .resolve(selector)
}

/// Build and push one api.
pub fn push_api(
    request: &PushRequest,
    runner: &dyn CommandRunner,
) -> Result<ReleaseReport, PushError> {
    slipway_telemetry::log_push_started!(
        namespace = %request.namespace,
        selector = request.selector.as_deref().unwrap_or("-"),
        "Pushing api"
    );
    let started = std::time::Instant::now();

    match run(request, runner) {
        Ok(report) => {
            slipway_telemetry::log_push_completed!(
                namespace = %report.namespace,
                services = report.services,
                warnings = report.warnings.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Api pushed"
            );
            Ok(report)
        }
        Err(e) => {
            slipway_telemetry::log_push_failed!(
                namespace = %request.namespace,
                error = %e,
                "Push failed"
            );
            Err(e)
        }
    }
}

fn run(request: &PushRequest, runner: &dyn CommandRunner) -> Result<ReleaseReport, PushError> {
    if request.namespace.trim().is_empty() {
        return Err(PushError::Usage(
            "missing api namespace. eg. push api <namespace>".to_string(),
        ));
    }
    namespace::validate(&request.namespace)?;

    let home = request.home.as_path();
    let settings = Settings::load(home)?;
    let keys = Keys::load(home)?;
    let resolved = ConfigResolver::new(home)
        .with_recipes_folder(settings.recipes.folder.clone())
        .resolve(request.selector.as_deref())?;

    let config = resolved.effective.clone();
    let bindings = Bindings::new().with(resolved.binding(), config.to_value());

    let release = ReleaseInfo {
        version: request.version.clone().or_else(|| config.version()),
        notes: request
            .notes
            .clone()
            .or_else(|| config.notes())
            .or_else(|| settings.release.notes.clone()),
        pushed_by: keys.user.id.clone().or_else(|| config.user_id()),
        stamp: if settings.release.stamp {
            keys.user.stamp.clone().or_else(|| config.user_stamp())
        } else {
            None
        },
    };
    let options = PipelineOptions {
        nocopy: request.no_copy || settings.build.nocopy || config.nocopy(),
        install: !request.no_install && config.install(),
        push_command: request
            .push_command
            .clone()
            .or_else(|| settings.push.command.clone()),
        keep_build: request.keep_build,
        store_policy: request.store_policy,
    };

    let mut ctx = PipelineContext::new(request.namespace.clone(), config, bindings, runner)
        .with_release(release)
        .with_options(options);
    ctx.advance(ReleaseStage::ConfigResolved);

    let workspace = request
        .workspace
        .clone()
        .unwrap_or_else(|| settings.workspace_dir(home));
    let source = settings.source_for(&workspace, &request.namespace);
    let build_root = home.join(BUILD_FOLDER);

    let working = assemble(&source, &build_root, &mut ctx)?;
    let mut guard = if request.keep_build {
        BuildFolderGuard::disarmed()
    } else {
        BuildFolderGuard::new(&working)
    };

    let spec = prepare_spec(&working, &mut ctx)?;
    let normalized = normalize_services(&working, &mut ctx)?;

    let folder = finalize(&working, &spec)?;
    guard.retarget(&folder);
    ctx.advance(ReleaseStage::Renamed);

    let outcome = publish(&build_root, &folder, &mut ctx)?;

    guard.cleanup()?;
    if !request.keep_build {
        ctx.advance(ReleaseStage::CleanedUp);
    }

    let (stages, warnings) = ctx.into_parts();
    Ok(ReleaseReport {
        namespace: spec.namespace().unwrap_or_default().to_string(),
        folder,
        kept: request.keep_build,
        services: normalized.written.len(),
        markers: normalized.markers,
        pushed_with: outcome.pushed_with,
        copied_to: outcome.copied_to,
        stages,
        warnings,
    })
}
