//! The build pipeline scheduler
//!
//! Decision-making is single-threaded: this loop alone owns the module
//! graph, the state table and the output ledgers. Stage execution is
//! dispatched onto a worker pool; workers receive an immutable context plus
//! immutable handlers and report one terminal result back over a channel.

use crate::cache::{self, TaskCache};
use crate::plan::BuildPlan;
use crate::report::{BuildFailure, BuildReport, ModuleOutcome};
use crate::state::ModuleState;
use crate::{PipelineError, PipelineResult};
use log::{debug, info, warn};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;
use trellis_model::{Coordinate, Stage};
use trellis_plugin::{ModuleContext, StageHandler};
use trellis_resolver::ModuleGraph;

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker count; 0 uses the pool default
    pub jobs: usize,
    /// Stop dispatching new units after the first failure and request
    /// cooperative cancellation of in-flight workers
    pub fail_fast: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jobs: 0,
            fail_fast: true,
        }
    }
}

/// Everything the scheduler needs to drive one module
pub struct ModuleSpec {
    pub coordinate: Coordinate,
    pub version: Version,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// The module's resolved runtime dependency artifacts
    pub dependency_artifacts: Vec<PathBuf>,
    /// Stage handlers contributed by the module's loaded plugins
    pub handlers: Vec<Arc<dyn StageHandler>>,
}

impl ModuleSpec {
    pub fn new(
        coordinate: Coordinate,
        version: Version,
        source_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            coordinate,
            version,
            source_dir,
            output_dir,
            dependency_artifacts: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn with_dependency_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.dependency_artifacts = artifacts;
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<Arc<dyn StageHandler>>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Stages this module has at least one handler bound for
    fn bound_stages(&self) -> BTreeSet<Stage> {
        self.handlers.iter().map(|handler| handler.stage()).collect()
    }
}

/// A worker's terminal result for one (module, stage) unit
enum UnitResult {
    Completed { outputs: Vec<PathBuf> },
    Failed { handler: String, message: String },
    Cancelled,
}

/// Drives lifecycle stages across the resolved module graph
pub struct Scheduler {
    config: PipelineConfig,
}

impl Scheduler {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Execute all stages through `target` for every module in the graph
    pub fn execute(
        &self,
        graph: &ModuleGraph,
        modules: &BTreeMap<Coordinate, ModuleSpec>,
        target: Stage,
    ) -> PipelineResult<BuildReport> {
        let started = Instant::now();

        let mut specs: BTreeMap<usize, &ModuleSpec> = BTreeMap::new();
        let mut bound: BTreeMap<usize, BTreeSet<Stage>> = BTreeMap::new();
        for (coordinate, spec) in modules {
            if let Some(id) = graph.index_of(coordinate) {
                let stages = spec.bound_stages();
                if !stages.is_empty() {
                    bound.insert(id, stages);
                }
                specs.insert(id, spec);
            }
        }

        let mut plan = BuildPlan::new(graph, &bound, target);
        let mut states = vec![ModuleState::Pending; graph.len()];
        let mut ledgers: Vec<BTreeMap<Stage, Vec<PathBuf>>> = vec![BTreeMap::new(); graph.len()];

        // Modules with no planned work complete trivially.
        for module in plan.idle_modules(graph) {
            states[module] = ModuleState::Completed;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map_err(|e| PipelineError::Pool(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<(usize, UnitResult)>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut ready: VecDeque<usize> = plan.initial_ready().into();
        let mut outstanding = 0usize;
        let mut first_failure: Option<BuildFailure> = None;

        info!(
            "executing {} units across {} modules through stage {}",
            plan.len(),
            graph.len(),
            target
        );

        loop {
            while let Some(id) = ready.pop_front() {
                let unit = plan.unit(id);
                if states[unit.module] == ModuleState::Failed {
                    continue;
                }
                if cancelled.load(Ordering::Relaxed) {
                    continue;
                }
                let Some(spec) = specs.get(&unit.module) else {
                    continue;
                };

                states[unit.module] = ModuleState::Running(unit.stage);
                debug!("dispatching {} {}", spec.coordinate, unit.stage);

                let handlers: Vec<Arc<dyn StageHandler>> = spec
                    .handlers
                    .iter()
                    .filter(|handler| handler.stage() == unit.stage)
                    .cloned()
                    .collect();
                let ctx = ModuleContext::new(
                    spec.coordinate.clone(),
                    spec.version.clone(),
                    spec.source_dir.clone(),
                    spec.output_dir.clone(),
                )
                .with_dependency_artifacts(spec.dependency_artifacts.clone())
                .with_prior_outputs(ledgers[unit.module].clone())
                .with_cancellation(Arc::clone(&cancelled));
                let task_cache =
                    TaskCache::new(spec.output_dir.join(".trellis").join("task-cache"));
                let flag = Arc::clone(&cancelled);
                let sender = tx.clone();

                pool.spawn(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        run_unit(&handlers, &ctx, &task_cache, &flag)
                    }))
                    .unwrap_or_else(|_| UnitResult::Failed {
                        handler: "worker".to_string(),
                        message: "stage handler panicked".to_string(),
                    });
                    // The scheduler only drops the receiver once nothing is
                    // outstanding, so a failed send is unreachable.
                    let _ = sender.send((id, result));
                });
                outstanding += 1;
            }

            if outstanding == 0 {
                break;
            }

            let (id, result) = rx
                .recv()
                .map_err(|_| PipelineError::WorkersLost { outstanding })?;
            outstanding -= 1;
            let unit = plan.unit(id);

            match result {
                UnitResult::Completed { outputs } => {
                    ledgers[unit.module]
                        .entry(unit.stage)
                        .or_default()
                        .extend(outputs);
                    // A dependency may have failed while this unit was in
                    // flight; the module stays failed and runs nothing more.
                    if states[unit.module] != ModuleState::Failed {
                        if plan.is_final_for_module(id) {
                            states[unit.module] = ModuleState::Completed;
                            info!("module {} completed", graph.coordinate(unit.module));
                        }
                        ready.extend(plan.complete(id));
                    }
                }
                UnitResult::Failed { handler, message } => {
                    warn!(
                        "module {} failed at {}: {}",
                        graph.coordinate(unit.module),
                        unit.stage,
                        message
                    );
                    states[unit.module] = ModuleState::Failed;
                    if first_failure.is_none() {
                        first_failure = Some(BuildFailure {
                            module: graph.coordinate(unit.module).clone(),
                            stage: unit.stage,
                            handler,
                            message,
                        });
                    }
                    // Everything depending on this module fails without
                    // running; independent in-flight work continues.
                    for dependent in graph.transitive_dependents(unit.module) {
                        if !states[dependent].is_terminal() {
                            states[dependent] = ModuleState::Failed;
                        }
                    }
                    if self.config.fail_fast {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                }
                UnitResult::Cancelled => {
                    // Dispatched before the cancellation request; skipped,
                    // not at fault.
                    if matches!(states[unit.module], ModuleState::Running(_)) {
                        states[unit.module] = ModuleState::Pending;
                    }
                }
            }
        }

        let modules_report = graph
            .indices()
            .map(|id| {
                (
                    graph.coordinate(id).clone(),
                    ModuleOutcome {
                        state: states[id],
                        outputs: std::mem::take(&mut ledgers[id]),
                    },
                )
            })
            .collect();

        Ok(BuildReport {
            modules: modules_report,
            first_failure,
            elapsed: started.elapsed(),
        })
    }
}

/// Execute one unit's handlers in order, consulting the task cache for
/// handlers that declare inputs.
fn run_unit(
    handlers: &[Arc<dyn StageHandler>],
    ctx: &ModuleContext,
    task_cache: &TaskCache,
    cancelled: &AtomicBool,
) -> UnitResult {
    let mut outputs = Vec::new();

    for handler in handlers {
        if cancelled.load(Ordering::Relaxed) {
            return UnitResult::Cancelled;
        }

        let fingerprint = handler
            .cache_inputs(ctx)
            .and_then(|inputs| cache::fingerprint(handler.name(), &inputs));
        if let Some(fingerprint) = &fingerprint {
            if let Some(cached) = task_cache.lookup(handler.name(), fingerprint) {
                info!("task '{}' is up to date", handler.name());
                outputs.extend(cached);
                continue;
            }
        }

        debug!("executing task '{}'", handler.name());
        match handler.execute(ctx) {
            Ok(output) => {
                if let Some(fingerprint) = &fingerprint {
                    task_cache.store(handler.name(), fingerprint, &output.outputs);
                }
                outputs.extend(output.outputs);
            }
            Err(e) => {
                return UnitResult::Failed {
                    handler: handler.name().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    UnitResult::Completed { outputs }
}
