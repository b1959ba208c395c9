//! Datasource generation.
//!
//! When the api declares `runtime.dataModels` and a generator command is
//! configured, the command runs inside the api folder and its stdout (a JSON
//! document) becomes `runtime.datasources`.

use std::path::Path;

use serde_json::Value;

use crate::error::PushError;
use crate::external::{expand_placeholders, CommandRunner, Invocation};
use crate::spec::{keys, ApiSpec};

/// Run the generator and store its output in the spec.
///
/// Returns `true` when datasources were generated. The generator line may
/// use `{folder}` for the api folder.
pub fn generate_datasources(
    spec: &mut ApiSpec,
    api_folder: &Path,
    generator: Option<&str>,
    runner: &dyn CommandRunner,
) -> Result<bool, PushError> {
    let Some(generator) = generator else {
        tracing::debug!("No datasource generator configured");
        return Ok(false);
    };
    if spec.data_models().is_none() {
        tracing::debug!("Api declares no data models");
        return Ok(false);
    }

    let folder = api_folder.display().to_string();
    let line = expand_placeholders(generator, &[("folder", &folder)])?;
    let output = runner.run(&Invocation::program(line, api_folder))?;

    let stdout = output.stdout.trim();
    if stdout.is_empty() {
        tracing::warn!(generator = %generator, "Datasource generator produced no output");
        return Ok(false);
    }

    let datasources: Value =
        serde_json::from_str(stdout).map_err(|e| PushError::ExternalCommand {
            command: generator.to_string(),
            reason: format!("output is not valid JSON: {}", e),
        })?;

    spec.runtime_mut()
        .insert(keys::DATASOURCES.to_string(), datasources);
    tracing::info!("Generated datasources");
    Ok(true)
}
