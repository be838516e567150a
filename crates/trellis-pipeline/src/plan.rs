//! Build plan construction
//!
//! A plan is the ModuleGraph crossed with the lifecycle-stage prefix for
//! the requested target: one unit per (module, stage) the module actually
//! binds work for. Each unit carries a prerequisite counter; a unit is
//! dispatchable only at zero. Plans are transient and rebuilt per
//! invocation.

use std::collections::{BTreeMap, BTreeSet};
use trellis_model::Stage;
use trellis_resolver::ModuleGraph;

/// One schedulable (module, stage) pair. `module` indexes the ModuleGraph
/// arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub module: usize,
    pub stage: Stage,
}

#[derive(Debug)]
struct UnitEntry {
    unit: Unit,
    /// Units that cannot start until this one completes
    dependents: Vec<usize>,
    /// Outstanding prerequisite count; dispatchable at zero
    remaining: usize,
}

/// The execution schedule for one build invocation
#[derive(Debug)]
pub struct BuildPlan {
    entries: Vec<UnitEntry>,
    units_by_module: BTreeMap<usize, Vec<usize>>,
}

impl BuildPlan {
    /// Build the plan for all stages through `target`, given the stages
    /// each module has handlers bound for. Modules absent from `bound` (or
    /// bound to no stage in range) contribute no units.
    pub fn new(graph: &ModuleGraph, bound: &BTreeMap<usize, BTreeSet<Stage>>, target: Stage) -> Self {
        let mut entries: Vec<UnitEntry> = Vec::new();
        let mut units_by_module: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for module in graph.indices() {
            let Some(stages) = bound.get(&module) else {
                continue;
            };
            for stage in Stage::through(target) {
                if !stages.contains(&stage) {
                    continue;
                }
                let id = entries.len();
                entries.push(UnitEntry {
                    unit: Unit { module, stage },
                    dependents: Vec::new(),
                    remaining: 0,
                });
                units_by_module.entry(module).or_default().push(id);
            }
        }

        // Wire prerequisites: the module's own previous bound stage, plus
        // each dependency module's last unit at or before the gate stage.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (id, entry) in entries.iter().enumerate() {
            let Unit { module, stage } = entry.unit;

            if let Some(&prev) = units_by_module
                .get(&module)
                .and_then(|units| units.iter().take_while(|&&u| u != id).last())
            {
                edges.push((prev, id));
            }

            let gate = dependency_gate(stage);
            for &dependency in graph.dependencies_of(module) {
                let prerequisite = units_by_module
                    .get(&dependency)
                    .and_then(|units| {
                        units
                            .iter()
                            .filter(|&&u| entries[u].unit.stage <= gate)
                            .last()
                    })
                    .copied();
                if let Some(prerequisite) = prerequisite {
                    edges.push((prerequisite, id));
                }
            }
        }
        for (from, to) in edges {
            entries[from].dependents.push(to);
            entries[to].remaining += 1;
        }

        Self {
            entries,
            units_by_module,
        }
    }

    pub fn unit(&self, id: usize) -> Unit {
        self.entries[id].unit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Units dispatchable at the start of the run
    pub fn initial_ready(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.remaining == 0)
            .map(|(id, _)| id)
            .collect()
    }

    /// Record a unit's completion, returning units that just became ready
    pub fn complete(&mut self, id: usize) -> Vec<usize> {
        let dependents = self.entries[id].dependents.clone();
        let mut ready = Vec::new();
        for dependent in dependents {
            let entry = &mut self.entries[dependent];
            entry.remaining -= 1;
            if entry.remaining == 0 {
                ready.push(dependent);
            }
        }
        ready
    }

    /// Whether `id` is the module's last planned unit
    pub fn is_final_for_module(&self, id: usize) -> bool {
        let module = self.entries[id].unit.module;
        self.units_by_module
            .get(&module)
            .and_then(|units| units.last())
            == Some(&id)
    }

    /// Planned unit ids of one module, in stage order
    pub fn units_of(&self, module: usize) -> &[usize] {
        self.units_by_module
            .get(&module)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Modules that contribute no units at all
    pub fn idle_modules(&self, graph: &ModuleGraph) -> Vec<usize> {
        graph
            .indices()
            .filter(|module| !self.units_by_module.contains_key(module))
            .collect()
    }
}

/// The stage a dependency module must have completed through before a
/// dependent runs `stage`. Archive is the provides stage: archive and
/// publish only need the dependency's consumable artifacts.
fn dependency_gate(stage: Stage) -> Stage {
    stage.min(Stage::Archive)
}
