//! Builds api projects into release folders and pushes them.
//!
//! A push copies the project into a build folder, stamps release metadata
//! onto its root spec, normalizes the service specs, renames the folder after
//! the final namespace and hands it to an external push command.

pub mod assemble;
pub mod config;
pub mod context;
pub mod error;
pub mod external;
pub mod generator;
pub mod json;
pub mod marker;
pub mod namespace;
pub mod overrides;
pub mod publish;
pub mod release;
pub mod service;
pub mod settings;
pub mod spec;
pub mod template;

pub use config::{ConfigKind, ConfigResolver, EffectiveConfig, ResolvedConfig};
pub use context::{PipelineContext, PipelineOptions, ReleaseInfo, ReleaseStage};
pub use error::{PushError, PushWarning};
pub use external::{CommandRunner, Invocation, SystemRunner};
pub use marker::{Marker, StorePolicy};
pub use publish::BuildFolderGuard;
pub use release::{push_api, resolve_config, PushArgs, PushRequest, PushTarget, ReleaseReport};
pub use settings::{Keys, Settings};
pub use spec::ApiSpec;
pub use template::Bindings;
