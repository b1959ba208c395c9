//! Shipping the assembled build folder.

use std::path::{Path, PathBuf};

use crate::assemble::{copy_tree, remove_path};
use crate::context::{PipelineContext, ReleaseStage};
use crate::error::{PushError, PushWarning};
use crate::external::{expand_placeholders, Invocation};

/// Deletes the build folder when dropped, unless disarmed.
///
/// The guard follows the folder through renames via [`retarget`].
///
/// [`retarget`]: BuildFolderGuard::retarget
#[derive(Debug)]
pub struct BuildFolderGuard {
    path: Option<PathBuf>,
}

impl BuildFolderGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A guard that never deletes anything.
    pub fn disarmed() -> Self {
        Self { path: None }
    }

    /// Point the guard at the folder's new location.
    pub fn retarget(&mut self, path: impl Into<PathBuf>) {
        if self.path.is_some() {
            self.path = Some(path.into());
        }
    }

    /// Keep the folder. Returns the path it would have deleted.
    pub fn disarm(&mut self) -> Option<PathBuf> {
        self.path.take()
    }

    /// Delete the folder now, reporting failures.
    pub fn cleanup(mut self) -> Result<(), PushError> {
        match self.path.take() {
            Some(path) => {
                remove_path(&path)?;
                tracing::info!(folder = %path.display(), "Removed build folder");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for BuildFolderGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = remove_path(&path) {
                slipway_telemetry::log_cleanup_failed!(
                    folder = %path.display(),
                    error = %e,
                    "Failed to remove build folder"
                );
            }
        }
    }
}

/// What publishing did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The push command that ran, if any.
    pub pushed_with: Option<String>,
    /// Where the build folder was copied to.
    pub copied_to: Option<PathBuf>,
    /// Post-build commands run, in order.
    pub commands: Vec<String>,
}

/// Install, copy and run post-build commands for the final build folder.
///
/// Relative `run` directories are resolved against the final folder. The
/// first failing command aborts publishing.
pub fn publish(
    build_root: &Path,
    final_folder: &Path,
    ctx: &mut PipelineContext<'_>,
) -> Result<PublishOutcome, PushError> {
    let mut outcome = PublishOutcome::default();
    let namespace = final_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if ctx.options.install {
        match ctx.options.push_command.clone() {
            Some(template) => {
                let folder = final_folder.display().to_string();
                let build = build_root.display().to_string();
                let line = expand_placeholders(
                    &template,
                    &[
                        ("namespace", namespace.as_str()),
                        ("folder", folder.as_str()),
                        ("build", build.as_str()),
                    ],
                )?;
                ctx.runner.run(&Invocation::program(line.clone(), build_root))?;
                tracing::info!(namespace = %namespace, "Pushed api");
                outcome.pushed_with = Some(line);
            }
            None => ctx.warn(PushWarning::no_push_command(&namespace)),
        }
    } else {
        tracing::info!(namespace = %namespace, "Install skipped");
    }

    if let Some(copy_to) = ctx.config.copy_to() {
        let target = copy_to.join(&namespace);
        remove_path(&target)?;
        std::fs::create_dir_all(&copy_to).map_err(|e| PushError::io_at(&copy_to, e))?;
        copy_tree(final_folder, &target)?;
        tracing::info!(target = %target.display(), "Copied build folder");
        outcome.copied_to = Some(target);
    }

    for (dir, commands) in ctx.config.run_commands() {
        let dir = resolve_dir(final_folder, &dir);
        for command in commands {
            ctx.runner.run(&Invocation::shell(command.clone(), &dir))?;
            outcome.commands.push(command);
        }
    }

    ctx.advance(ReleaseStage::Published);
    Ok(outcome)
}

fn resolve_dir(base: &Path, dir: &str) -> PathBuf {
    let path = Path::new(dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
