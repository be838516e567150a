//! The published plugin-facing contract
//!
//! This is the only surface that crosses the isolation boundary: a plugin
//! registers stage handlers, a handler executes against a module context.

use crate::config::{OptionSpec, PluginConfig};
use crate::PluginResult;
use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use trellis_model::{Coordinate, Stage};

/// A stage handler failure, reported per module
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Files a handler produced, recorded as the stage's outputs
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub outputs: Vec<PathBuf>,
}

impl StageOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn files(outputs: Vec<PathBuf>) -> Self {
        Self { outputs }
    }
}

pub type HandlerResult = Result<StageOutput, HandlerError>;

/// Everything a stage handler may read while executing: module identity,
/// directory locations, the module's resolved runtime dependency artifacts,
/// and outputs of the module's own earlier stages. Immutable; workers share
/// it read-only.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub module: Coordinate,
    pub version: Version,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub dependency_artifacts: Vec<PathBuf>,
    prior_outputs: BTreeMap<Stage, Vec<PathBuf>>,
    cancelled: Arc<AtomicBool>,
}

impl ModuleContext {
    pub fn new(
        module: Coordinate,
        version: Version,
        source_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            module,
            version,
            source_dir,
            output_dir,
            dependency_artifacts: Vec::new(),
            prior_outputs: BTreeMap::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach the module's resolved dependency artifacts
    pub fn with_dependency_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.dependency_artifacts = artifacts;
        self
    }

    /// Attach outputs of earlier stages this handler is entitled to read
    pub fn with_prior_outputs(mut self, outputs: BTreeMap<Stage, Vec<PathBuf>>) -> Self {
        self.prior_outputs = outputs;
        self
    }

    /// Attach the build run's cooperative cancellation flag
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Outputs an earlier stage of this module recorded
    pub fn outputs_of(&self, stage: Stage) -> &[PathBuf] {
        self.prior_outputs
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the build requested cooperative cancellation. Long-running
    /// handlers should poll this and return early.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A unit of work bound to exactly one lifecycle stage
pub trait StageHandler: Send + Sync {
    /// Handler name, used in logs and as the task cache key
    fn name(&self) -> &str;

    /// The one stage this handler is bound to
    fn stage(&self) -> Stage;

    /// Execute against a module context
    fn execute(&self, ctx: &ModuleContext) -> HandlerResult;

    /// Input paths for result caching. `None` opts out: the handler always
    /// runs.
    fn cache_inputs(&self, ctx: &ModuleContext) -> Option<Vec<PathBuf>> {
        let _ = ctx;
        None
    }
}

/// The plugin entry point: given validated configuration, register zero or
/// more stage handlers.
pub trait Plugin: Send + Sync {
    /// Configuration options this plugin accepts
    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }

    /// Produce the stage handlers for one module
    fn handlers(&self, config: &PluginConfig) -> PluginResult<Vec<Box<dyn StageHandler>>>;
}
