//! Scheduling order, concurrency and failure containment

use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use trellis_model::{Coordinate, Stage};
use trellis_pipeline::{ModuleSpec, ModuleState, PipelineConfig, Scheduler};
use trellis_plugin::{HandlerError, HandlerResult, ModuleContext, StageHandler, StageOutput};
use trellis_resolver::ModuleGraph;

/// Shared execution trace: "module:stage" entries in completion order
#[derive(Clone, Default)]
struct Events(Arc<Mutex<Vec<String>>>);

impl Events {
    fn record(&self, ctx: &ModuleContext, stage: Stage) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.module.name, stage));
    }

    fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, entry: &str) -> Option<usize> {
        self.snapshot().iter().position(|e| e == entry)
    }
}

struct RecordingHandler {
    name: String,
    stage: Stage,
    events: Events,
    fail: bool,
    barrier: Option<Arc<Barrier>>,
}

impl RecordingHandler {
    fn new(stage: Stage, events: &Events) -> Self {
        Self {
            name: format!("record-{}", stage),
            stage,
            events: events.clone(),
            fail: false,
            barrier: None,
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }
}

impl StageHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn execute(&self, ctx: &ModuleContext) -> HandlerResult {
        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }
        self.events.record(ctx, self.stage);
        if self.fail {
            return Err(HandlerError::new("deliberate failure"));
        }
        Ok(StageOutput::none())
    }
}

fn coordinate(name: &str) -> Coordinate {
    Coordinate::new("io.trellis.demo", name)
}

fn spec(name: &str, handlers: Vec<Arc<dyn StageHandler>>) -> ModuleSpec {
    ModuleSpec::new(
        coordinate(name),
        Version::new(1, 0, 0),
        PathBuf::from(format!("{}/src", name)),
        PathBuf::from(format!("{}/target", name)),
    )
    .with_handlers(handlers)
}

fn graph_of(modules: &[(&str, &[&str])]) -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    for (name, _) in modules {
        graph.add_module(coordinate(name));
    }
    for (name, deps) in modules {
        let from = graph.index_of(&coordinate(name)).unwrap();
        for dep in *deps {
            let to = graph.index_of(&coordinate(dep)).unwrap();
            graph.add_edge(from, to);
        }
    }
    graph
}

fn scheduler() -> Scheduler {
    Scheduler::new(PipelineConfig {
        jobs: 4,
        fail_fast: false,
    })
}

#[test]
fn dependency_compile_completes_before_dependent_compile_starts() {
    let events = Events::default();
    let graph = graph_of(&[("core", &[]), ("cli", &["core"])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (
            coordinate("core"),
            spec(
                "core",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>],
            ),
        ),
        (
            coordinate("cli"),
            spec(
                "cli",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Compile).unwrap();

    assert!(report.success());
    assert!(events.position("core:compile") < events.position("cli:compile"));
}

#[test]
fn independent_modules_run_the_same_stage_concurrently() {
    let events = Events::default();
    // Both handlers block on the same barrier: the test only completes if
    // the two modules are actually in flight at the same time.
    let barrier = Arc::new(Barrier::new(2));
    let graph = graph_of(&[("a", &[]), ("d", &[])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (
            coordinate("a"),
            spec(
                "a",
                vec![Arc::new(
                    RecordingHandler::new(Stage::Compile, &events).with_barrier(Arc::clone(&barrier)),
                ) as Arc<_>],
            ),
        ),
        (
            coordinate("d"),
            spec(
                "d",
                vec![Arc::new(
                    RecordingHandler::new(Stage::Compile, &events).with_barrier(barrier),
                ) as Arc<_>],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Compile).unwrap();

    assert!(report.success());
    assert_eq!(events.snapshot().len(), 2);
}

#[test]
fn failure_marks_dependents_failed_without_running_them() {
    let events = Events::default();
    let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("d", &[])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (
            coordinate("a"),
            spec(
                "a",
                vec![
                    Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>,
                    Arc::new(RecordingHandler::new(Stage::Test, &events).failing()) as Arc<_>,
                ],
            ),
        ),
        (
            coordinate("b"),
            spec(
                "b",
                vec![Arc::new(RecordingHandler::new(Stage::Test, &events)) as Arc<_>],
            ),
        ),
        (
            coordinate("d"),
            spec(
                "d",
                vec![Arc::new(RecordingHandler::new(Stage::Test, &events)) as Arc<_>],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Test).unwrap();

    assert!(!report.success());
    assert_eq!(report.state_of(&coordinate("a")), Some(ModuleState::Failed));
    assert_eq!(report.state_of(&coordinate("b")), Some(ModuleState::Failed));
    assert_eq!(
        report.state_of(&coordinate("d")),
        Some(ModuleState::Completed)
    );
    // b's test stage never executed
    assert!(!events.snapshot().contains(&"b:test".to_string()));

    let failure = report.first_failure.unwrap();
    assert_eq!(failure.module, coordinate("a"));
    assert_eq!(failure.stage, Stage::Test);
}

#[test]
fn transitive_dependents_of_a_failure_are_skipped() {
    let events = Events::default();
    let graph = graph_of(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (
            coordinate("a"),
            spec(
                "a",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events).failing()) as Arc<_>],
            ),
        ),
        (
            coordinate("b"),
            spec(
                "b",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>],
            ),
        ),
        (
            coordinate("c"),
            spec(
                "c",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Compile).unwrap();

    assert_eq!(report.failed().len(), 3);
    assert_eq!(events.snapshot(), vec!["a:compile".to_string()]);
}

#[test]
fn stages_without_handlers_are_skipped() {
    let events = Events::default();
    let graph = graph_of(&[("core", &[])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [(
        coordinate("core"),
        spec(
            "core",
            vec![
                Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>,
                Arc::new(RecordingHandler::new(Stage::Archive, &events)) as Arc<_>,
            ],
        ),
    )]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Archive).unwrap();

    assert!(report.success());
    // test and resources never appear; compile precedes archive
    assert_eq!(
        events.snapshot(),
        vec!["core:compile".to_string(), "core:archive".to_string()]
    );
}

#[test]
fn module_with_no_handlers_completes_trivially() {
    let events = Events::default();
    let graph = graph_of(&[("empty", &[]), ("cli", &["empty"])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (coordinate("empty"), spec("empty", Vec::new())),
        (
            coordinate("cli"),
            spec(
                "cli",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Compile).unwrap();

    assert!(report.success());
    assert_eq!(
        report.state_of(&coordinate("empty")),
        Some(ModuleState::Completed)
    );
}

#[test]
fn prior_stage_outputs_are_visible_to_later_stages() {
    struct ProducingHandler;

    impl StageHandler for ProducingHandler {
        fn name(&self) -> &str {
            "produce"
        }

        fn stage(&self) -> Stage {
            Stage::Compile
        }

        fn execute(&self, _ctx: &ModuleContext) -> HandlerResult {
            Ok(StageOutput::files(vec![PathBuf::from("out/classes")]))
        }
    }

    struct ConsumingHandler {
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl StageHandler for ConsumingHandler {
        fn name(&self) -> &str {
            "consume"
        }

        fn stage(&self) -> Stage {
            Stage::Archive
        }

        fn execute(&self, ctx: &ModuleContext) -> HandlerResult {
            self.seen
                .lock()
                .map_err(|_| HandlerError::new("poisoned"))?
                .extend(ctx.outputs_of(Stage::Compile).to_vec());
            Ok(StageOutput::none())
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let graph = graph_of(&[("core", &[])]);
    let modules: BTreeMap<Coordinate, ModuleSpec> = [(
        coordinate("core"),
        spec(
            "core",
            vec![
                Arc::new(ProducingHandler) as Arc<_>,
                Arc::new(ConsumingHandler {
                    seen: Arc::clone(&seen),
                }) as Arc<_>,
            ],
        ),
    )]
    .into_iter()
    .collect();

    let report = scheduler().execute(&graph, &modules, Stage::Archive).unwrap();

    assert!(report.success());
    assert_eq!(*seen.lock().unwrap(), vec![PathBuf::from("out/classes")]);
    // outputs also surface in the report ledger
    let outcome = &report.modules[&coordinate("core")];
    assert_eq!(
        outcome.outputs[&Stage::Compile],
        vec![PathBuf::from("out/classes")]
    );
}

#[test]
fn cached_task_is_skipped_on_unchanged_inputs() {
    struct CachedHandler {
        input: PathBuf,
        runs: Arc<AtomicUsize>,
    }

    impl StageHandler for CachedHandler {
        fn name(&self) -> &str {
            "cached-compile"
        }

        fn stage(&self) -> Stage {
            Stage::Compile
        }

        fn execute(&self, _ctx: &ModuleContext) -> HandlerResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutput::files(vec![PathBuf::from("out/lib")]))
        }

        fn cache_inputs(&self, _ctx: &ModuleContext) -> Option<Vec<PathBuf>> {
            Some(vec![self.input.clone()])
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("main.src");
    std::fs::write(&input, "source").unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let graph = graph_of(&[("core", &[])]);
    let make_modules = |runs: Arc<AtomicUsize>| -> BTreeMap<Coordinate, ModuleSpec> {
        [(
            coordinate("core"),
            ModuleSpec::new(
                coordinate("core"),
                Version::new(1, 0, 0),
                dir.path().to_path_buf(),
                dir.path().join("target"),
            )
            .with_handlers(vec![Arc::new(CachedHandler {
                input: input.clone(),
                runs,
            }) as Arc<_>]),
        )]
        .into_iter()
        .collect()
    };

    let first = scheduler()
        .execute(&graph, &make_modules(Arc::clone(&runs)), Stage::Compile)
        .unwrap();
    assert!(first.success());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Unchanged inputs: the task is replayed from cache, not run.
    let second = scheduler()
        .execute(&graph, &make_modules(Arc::clone(&runs)), Stage::Compile)
        .unwrap();
    assert!(second.success());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        second.modules[&coordinate("core")].outputs[&Stage::Compile],
        vec![PathBuf::from("out/lib")]
    );

    // Changed inputs force a rerun.
    std::fs::write(&input, "changed source").unwrap();
    let third = scheduler()
        .execute(&graph, &make_modules(Arc::clone(&runs)), Stage::Compile)
        .unwrap();
    assert!(third.success());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn fail_fast_stops_dispatching_new_units() {
    let events = Events::default();
    let graph = graph_of(&[("bad", &[]), ("slow", &[])]);
    // bad fails at compile; slow has compile then test. With fail_fast the
    // scheduler may finish in-flight work but must not start slow:test once
    // the failure is observed before it becomes ready.
    let modules: BTreeMap<Coordinate, ModuleSpec> = [
        (
            coordinate("bad"),
            spec(
                "bad",
                vec![Arc::new(RecordingHandler::new(Stage::Compile, &events).failing()) as Arc<_>],
            ),
        ),
        (
            coordinate("slow"),
            spec(
                "slow",
                vec![
                    Arc::new(RecordingHandler::new(Stage::Compile, &events)) as Arc<_>,
                    Arc::new(RecordingHandler::new(Stage::Test, &events)) as Arc<_>,
                ],
            ),
        ),
    ]
    .into_iter()
    .collect();

    let report = Scheduler::new(PipelineConfig {
        jobs: 1,
        fail_fast: true,
    })
    .execute(&graph, &modules, Stage::Test)
    .unwrap();

    assert!(!report.success());
    assert_eq!(report.state_of(&coordinate("bad")), Some(ModuleState::Failed));
    // slow never reached Completed: its remaining units were not dispatched
    assert_ne!(
        report.state_of(&coordinate("slow")),
        Some(ModuleState::Completed)
    );
}
