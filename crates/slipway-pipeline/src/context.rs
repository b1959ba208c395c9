//! State threaded through one release run.

use std::fmt;

use serde::Serialize;

use crate::config::EffectiveConfig;
use crate::error::PushWarning;
use crate::external::CommandRunner;
use crate::marker::StorePolicy;
use crate::template::Bindings;

/// Stages of a release run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    ConfigResolved,
    SourceCopied,
    SpecStamped,
    NamespaceValidated,
    ServicesNormalized,
    Renamed,
    Published,
    CleanedUp,
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseStage::ConfigResolved => "config_resolved",
            ReleaseStage::SourceCopied => "source_copied",
            ReleaseStage::SpecStamped => "spec_stamped",
            ReleaseStage::NamespaceValidated => "namespace_validated",
            ReleaseStage::ServicesNormalized => "services_normalized",
            ReleaseStage::Renamed => "renamed",
            ReleaseStage::Published => "published",
            ReleaseStage::CleanedUp => "cleaned_up",
        };
        f.write_str(name)
    }
}

/// Release metadata stamped onto the api spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Version appended to the name and namespace.
    pub version: Option<String>,
    pub notes: Option<String>,
    /// Identity recorded as `release.pushedBy`.
    pub pushed_by: Option<String>,
    /// User stamp appended to the namespace, when stamping is enabled.
    pub stamp: Option<String>,
}

/// Switches decided before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Reuse the existing build folder instead of copying the source.
    pub nocopy: bool,
    /// Run the push command.
    pub install: bool,
    /// Push command line with `{namespace}`, `{folder}` and `{build}` placeholders.
    pub push_command: Option<String>,
    /// Leave the final build folder on disk.
    pub keep_build: bool,
    pub store_policy: StorePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            nocopy: false,
            install: true,
            push_command: None,
            keep_build: false,
            store_policy: StorePolicy::WhenFound,
        }
    }
}

/// Everything a stage needs, owned by the run.
pub struct PipelineContext<'r> {
    /// Namespace as given on the command line.
    pub namespace: String,
    pub config: EffectiveConfig,
    pub bindings: Bindings,
    pub release: ReleaseInfo,
    pub options: PipelineOptions,
    pub runner: &'r dyn CommandRunner,
    stages: Vec<ReleaseStage>,
    warnings: Vec<PushWarning>,
}

impl<'r> PipelineContext<'r> {
    pub fn new(
        namespace: impl Into<String>,
        config: EffectiveConfig,
        bindings: Bindings,
        runner: &'r dyn CommandRunner,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            config,
            bindings,
            release: ReleaseInfo::default(),
            options: PipelineOptions::default(),
            runner,
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_release(mut self, release: ReleaseInfo) -> Self {
        self.release = release;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Record that a stage completed.
    pub fn advance(&mut self, stage: ReleaseStage) {
        slipway_telemetry::log_stage_reached!(
            namespace = %self.namespace,
            stage = %stage,
            "Release stage reached"
        );
        self.stages.push(stage);
    }

    /// Last completed stage.
    pub fn stage(&self) -> Option<ReleaseStage> {
        self.stages.last().copied()
    }

    pub fn stages(&self) -> &[ReleaseStage] {
        &self.stages
    }

    pub fn warn(&mut self, warning: PushWarning) {
        slipway_telemetry::log_warning_recorded!(code = %warning.code, "{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[PushWarning] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<ReleaseStage>, Vec<PushWarning>) {
        (self.stages, self.warnings)
    }
}

impl fmt::Debug for PipelineContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("namespace", &self.namespace)
            .field("config", &self.config)
            .field("release", &self.release)
            .field("options", &self.options)
            .field("stages", &self.stages)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::testing::RecordingRunner;

    #[test]
    fn stages_are_recorded_in_order() {
        let runner = RecordingRunner::default();
        let mut ctx = PipelineContext::new(
            "shop",
            EffectiveConfig::default(),
            Bindings::new(),
            &runner,
        );
        assert_eq!(ctx.stage(), None);

        ctx.advance(ReleaseStage::ConfigResolved);
        ctx.advance(ReleaseStage::SourceCopied);
        assert_eq!(ctx.stage(), Some(ReleaseStage::SourceCopied));
        assert!(ReleaseStage::SourceCopied < ReleaseStage::CleanedUp);

        ctx.warn(PushWarning::no_push_command("shop"));
        let (stages, warnings) = ctx.into_parts();
        assert_eq!(stages.len(), 2);
        assert_eq!(warnings[0].code, "W2041");
    }

    #[test]
    fn stage_names() {
        assert_eq!(ReleaseStage::NamespaceValidated.to_string(), "namespace_validated");
        assert_eq!(
            serde_json::to_value(ReleaseStage::CleanedUp).unwrap(),
            serde_json::json!("cleaned_up")
        );
    }
}
