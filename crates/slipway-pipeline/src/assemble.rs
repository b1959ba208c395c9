//! Build folder assembly.
//!
//! Turns a source api project into a stamped, validated build folder:
//!
//! 1. copy the project into `<home>/build/<namespace>` and run the external
//!    build tool when the project has a build descriptor;
//! 2. drop excluded paths and canonicalise YAML specs to JSON;
//! 3. stamp release metadata onto `api.json`, template it and validate the
//!    final namespace;
//! 4. generate datasources and normalize the service specs;
//! 5. rename the folder after the final namespace.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::config::EffectiveConfig;
use crate::context::{PipelineContext, ReleaseInfo, ReleaseStage};
use crate::error::PushError;
use crate::external::Invocation;
use crate::generator::generate_datasources;
use crate::json::{find_document, merge_objects};
use crate::namespace;
use crate::service::{self, NormalizeReport, TransformContext, SERVICES_FOLDER};
use crate::spec::{canonicalize_yaml, keys, ApiSpec};
use crate::template::transform;

/// Format of `release.date`.
pub const RELEASE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Copy a directory tree. Returns the number of files copied.
///
/// Symbolic links are followed; the copy holds their targets.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, PushError> {
    let mut files = 0;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            PushError::io_at(&path, e.into())
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| PushError::io_at(&target, e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| PushError::io_at(entry.path(), e))?;
            files += 1;
        }
    }
    Ok(files)
}

/// Remove a file or directory. Missing paths are ignored.
pub fn remove_path(path: &Path) -> Result<(), PushError> {
    let result = match std::fs::symlink_metadata(path) {
        Err(_) => return Ok(()),
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
    };
    result.map_err(|e| PushError::io_at(path, e))
}

/// Copy and prepare the build folder. Returns the in-progress api folder.
pub fn assemble(
    source: &Path,
    build_root: &Path,
    ctx: &mut PipelineContext<'_>,
) -> Result<PathBuf, PushError> {
    std::fs::create_dir_all(build_root).map_err(|e| PushError::io_at(build_root, e))?;
    let working = build_root.join(&ctx.namespace);

    if ctx.options.nocopy {
        tracing::info!(folder = %working.display(), "Reusing existing build folder");
    } else {
        if !source.is_dir() {
            return Err(PushError::ApiSpecNotFound {
                namespace: ctx.namespace.clone(),
                folder: source.to_path_buf(),
            });
        }

        remove_path(&working)?;
        let files = copy_tree(source, &working)?;
        tracing::info!(
            source = %source.display(),
            folder = %working.display(),
            files,
            "Copied api project"
        );

        run_build_tool(&working, build_root, ctx)?;
        remove_excluded(&working, &ctx.config.excludes())?;
        canonicalize_yaml(&working)?;
    }

    ctx.advance(ReleaseStage::SourceCopied);
    Ok(working)
}

fn run_build_tool(
    working: &Path,
    build_root: &Path,
    ctx: &PipelineContext<'_>,
) -> Result<(), PushError> {
    let descriptor = working.join(ctx.config.build_marker());
    if !descriptor.is_file() {
        return Ok(());
    }

    ctx.runner
        .run(&Invocation::program(ctx.config.build_tool(), working))?;

    let output = locate_build_output(&working.join(ctx.config.build_output()))?;
    tracing::info!(output = %output.display(), "Using build tool output");

    let staged = build_root.join(format!(".{}.output", ctx.namespace));
    remove_path(&staged)?;
    std::fs::rename(&output, &staged).map_err(|e| PushError::io_at(&output, e))?;
    remove_path(working)?;
    std::fs::rename(&staged, working).map_err(|e| PushError::io_at(&staged, e))?;
    Ok(())
}

/// Find the single sub-folder of `output` that holds an api spec.
pub fn locate_build_output(output: &Path) -> Result<PathBuf, PushError> {
    let entries = match std::fs::read_dir(output) {
        Ok(entries) => entries,
        Err(_) => return Err(PushError::MissingBuildOutput(output.to_path_buf())),
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() && find_document(p, "api").is_some())
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(PushError::MissingBuildOutput(output.to_path_buf())),
        1 => Ok(candidates.remove(0)),
        _ => Err(PushError::AmbiguousBuildOutput {
            folder: output.to_path_buf(),
            candidates: candidates
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        }),
    }
}

fn remove_excluded(working: &Path, excludes: &[String]) -> Result<(), PushError> {
    for exclude in excludes {
        let relative = Path::new(exclude);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            tracing::warn!(path = %exclude, "Ignoring exclude outside the build folder");
            continue;
        }
        let target = working.join(relative);
        remove_path(&target)?;
        tracing::debug!(path = %target.display(), "Removed excluded path");
    }
    Ok(())
}

/// Stamp release metadata and return the working namespace.
///
/// The `release` block is rebuilt from scratch, then the configured
/// `release` and `api` blocks are merged on top.
pub fn stamp_release(
    spec: &mut ApiSpec,
    raw_namespace: &str,
    release: &ReleaseInfo,
    config: &EffectiveConfig,
    now: DateTime<Utc>,
) -> String {
    let mut block = Map::new();
    block.insert(
        keys::RELEASE_DATE.to_string(),
        Value::String(now.format(RELEASE_DATE_FORMAT).to_string()),
    );

    let mut ns = raw_namespace.to_string();
    if let Some(version) = release.version.as_deref().filter(|v| !v.is_empty()) {
        block.insert(
            keys::RELEASE_VERSION.to_string(),
            Value::String(version.to_string()),
        );
        ns = namespace::with_version(&ns, version);
        if let Some(name) = spec.name().map(str::to_string) {
            spec.set_name(format!("{} ( {} )", name, version));
        }
    }
    if let Some(stamp) = release.stamp.as_deref().filter(|s| !s.is_empty()) {
        ns = namespace::with_stamp(&ns, stamp);
    }
    let ns = namespace::finalize(&ns);
    spec.set_namespace(ns.clone());

    if let Some(user) = &release.pushed_by {
        block.insert(
            keys::RELEASE_PUSHED_BY.to_string(),
            Value::String(user.clone()),
        );
    }
    if let Some(notes) = &release.notes {
        block.insert(keys::RELEASE_NOTES.to_string(), Value::String(notes.clone()));
    }
    if let Some(extra) = config.release_overrides() {
        merge_objects(&mut block, extra);
    }
    *spec.release_mut() = block;

    if let Some(api) = config.api_overrides() {
        merge_objects(spec.as_map_mut(), &api);
    }
    ns
}

/// Stamp, template, validate and persist the root spec, then generate datasources.
pub fn prepare_spec(
    api_folder: &Path,
    ctx: &mut PipelineContext<'_>,
) -> Result<ApiSpec, PushError> {
    let mut spec = ApiSpec::load(api_folder, &ctx.namespace)?;
    let working_ns = stamp_release(
        &mut spec,
        &ctx.namespace,
        &ctx.release,
        &ctx.config,
        Utc::now(),
    );
    ctx.advance(ReleaseStage::SpecStamped);

    let mut spec = match transform(&spec.into_value(), &ctx.bindings) {
        Value::Object(doc) => ApiSpec::from_map(doc),
        _ => ApiSpec::default(),
    };
    let final_ns = spec.namespace().unwrap_or_default();
    namespace::validate(final_ns)?;
    tracing::info!(
        namespace = %final_ns,
        stamped = %working_ns,
        "Validated api namespace"
    );
    ctx.advance(ReleaseStage::NamespaceValidated);

    spec.store(api_folder)?;

    let generator = ctx.config.generator();
    if generate_datasources(&mut spec, api_folder, generator.as_deref(), ctx.runner)? {
        spec.store(api_folder)?;
    }
    Ok(spec)
}

/// Normalize `resources/services` of the api folder.
pub fn normalize_services(
    api_folder: &Path,
    ctx: &mut PipelineContext<'_>,
) -> Result<NormalizeReport, PushError> {
    let rules = ctx.config.override_rules()?;
    let prefix = ctx.config.api_prefix();
    let transform_ctx = TransformContext {
        bindings: &ctx.bindings,
        prefix: prefix.as_deref(),
        rules: &rules,
        store_policy: ctx.options.store_policy,
    };

    let report = service::normalize(api_folder, &api_folder.join(SERVICES_FOLDER), &transform_ctx)?;
    for warning in &report.warnings {
        ctx.warn(warning.clone());
    }
    ctx.advance(ReleaseStage::ServicesNormalized);
    Ok(report)
}

/// Rename the api folder after the spec's final namespace, replacing any
/// stale folder of that name.
pub fn finalize(api_folder: &Path, spec: &ApiSpec) -> Result<PathBuf, PushError> {
    let ns = spec.namespace().unwrap_or_default();
    namespace::validate(ns)?;

    let parent = api_folder.parent().unwrap_or(Path::new("."));
    let target = parent.join(ns);
    if target == api_folder {
        return Ok(target);
    }

    remove_path(&target)?;
    std::fs::rename(api_folder, &target).map_err(|e| PushError::io_at(api_folder, e))?;
    tracing::info!(folder = %target.display(), "Renamed build folder");
    Ok(target)
}
