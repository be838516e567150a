//! Trellis build pipeline scheduling
//!
//! Drives lifecycle stages across the resolved module graph: a build plan
//! of (module, stage) units with prerequisite counters, a single-threaded
//! scheduler owning all graph and state tables, and a worker pool executing
//! independent units concurrently with failure containment and cooperative
//! cancellation.

pub mod cache;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod state;

pub use cache::TaskCache;
pub use plan::{BuildPlan, Unit};
pub use report::{BuildFailure, BuildReport, ModuleOutcome};
pub use scheduler::{ModuleSpec, PipelineConfig, Scheduler};
pub use state::ModuleState;

/// Pipeline infrastructure errors. Stage-execution failures are not errors
/// at this level; they are contained per module and reported through
/// [`BuildReport`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("cyclic dependency: {0}")]
    Cycle(String),

    #[error("worker pool: {0}")]
    Pool(String),

    #[error("worker channel closed with {outstanding} units outstanding")]
    WorkersLost { outstanding: usize },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
