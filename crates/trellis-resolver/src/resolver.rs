//! The dependency resolver
//!
//! Resolution runs in universes: one global universe for every module's
//! external dependencies (so the whole build converges on one version per
//! coordinate), and one isolated universe per plugin binding (so plugins
//! with conflicting dependency versions never interfere).

use crate::graph::{GraphError, ModuleGraph};
use log::{debug, warn};
use semver::Version;
use std::collections::BTreeMap;
use thiserror::Error;
use trellis_model::{
    ComponentDescriptor, Coordinate, EffectiveDefinition, PluginBinding, Scope, VersionSpec,
};

mod solver;

use solver::select_version;

/// Rounds of transitive expansion before resolution is declared divergent.
/// Real graphs settle in a handful of rounds; oscillation needs mutually
/// contradictory descriptors.
const FIXED_POINT_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no version of '{coordinate}' satisfies all requests: {requests}")]
    UnresolvableVersion { coordinate: String, requests: String },

    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("component lookup failed for '{coordinate}': {reason}")]
    Component { coordinate: String, reason: String },

    #[error("resolution did not reach a fixed point after {limit} rounds")]
    Diverged { limit: usize },
}

impl ResolverError {
    /// Create an unresolvable-version error listing every competing request
    pub fn unresolvable(coordinate: &Coordinate, requests: &[Request]) -> Self {
        let requests = requests
            .iter()
            .map(|r| format!("{} requires {}", r.requester, r.spec))
            .collect::<Vec<_>>()
            .join(", ");
        Self::UnresolvableVersion {
            coordinate: coordinate.to_string(),
            requests,
        }
    }

    /// Create a component lookup error
    pub fn component(coordinate: &Coordinate, reason: impl ToString) -> Self {
        Self::Component {
            coordinate: coordinate.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<GraphError> for ResolverError {
    fn from(error: GraphError) -> Self {
        match error {
            GraphError::Cycle(path) => Self::CyclicDependency(path),
            GraphError::UnknownModule(name) => Self::Component {
                coordinate: name,
                reason: "unknown module".to_string(),
            },
        }
    }
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// External-coordinate callback, supplied by the component repository
pub trait ComponentSource {
    /// Enumerate the versions available for a coordinate
    fn available_versions(&self, coordinate: &Coordinate) -> ResolverResult<Vec<Version>>;

    /// Fetch the persisted descriptor of one concrete component
    fn descriptor(
        &self,
        coordinate: &Coordinate,
        version: &Version,
    ) -> ResolverResult<ComponentDescriptor>;
}

/// One declared dependency request, tagged with its declaring node
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub coordinate: Coordinate,
    pub spec: VersionSpec,
    pub scope: Scope,
    /// The module, plugin or component that declared this request
    pub requester: String,
}

/// A resolved component owning its resolved transitive dependencies.
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComponent {
    pub coordinate: Coordinate,
    pub version: Version,
    pub scope: Scope,
    pub dependencies: Vec<ResolvedComponent>,
}

/// A resolved flat dependency set, kept as the forest of direct requests
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedSet {
    pub components: Vec<ResolvedComponent>,
}

impl ResolvedSet {
    /// Flatten to one entry per coordinate, in deterministic coordinate
    /// order.
    pub fn flatten(&self) -> Vec<&ResolvedComponent> {
        let mut flat: BTreeMap<&Coordinate, &ResolvedComponent> = BTreeMap::new();
        let mut stack: Vec<&ResolvedComponent> = self.components.iter().collect();
        while let Some(component) = stack.pop() {
            if flat.insert(&component.coordinate, component).is_none() {
                stack.extend(component.dependencies.iter());
            }
        }
        flat.into_values().collect()
    }

    /// Flattened components retained at runtime scope
    pub fn runtime(&self) -> Vec<&ResolvedComponent> {
        self.flatten()
            .into_iter()
            .filter(|c| c.scope == Scope::Runtime)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// A plugin binding pinned to a concrete version with its own isolated
/// dependency set
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub binding: PluginBinding,
    pub version: Version,
    pub dependencies: ResolvedSet,
}

/// Per-module resolution output
#[derive(Debug, Clone, Default)]
pub struct ModuleResolution {
    /// The module's resolved flat external dependency set, including
    /// runtime-scoped dependencies inherited from the modules it depends on
    pub dependencies: ResolvedSet,
    /// Plugin bindings pinned to concrete versions, each with an isolated
    /// dependency universe
    pub plugins: Vec<ResolvedPlugin>,
}

/// The resolved build graph: module ordering plus per-module dependency and
/// plugin sets
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub graph: ModuleGraph,
    modules: BTreeMap<Coordinate, ModuleResolution>,
}

impl ResolvedGraph {
    /// Resolution output for one module
    pub fn module(&self, coordinate: &Coordinate) -> Option<&ModuleResolution> {
        self.modules.get(coordinate)
    }
}

/// Core dependency resolver
pub struct Resolver<'a, S> {
    source: &'a S,
}

impl<'a, S: ComponentSource> Resolver<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Resolve the effective definitions of all modules in scope into a
    /// module graph annotated with resolved external and plugin
    /// dependencies.
    pub fn resolve(&self, definitions: &[EffectiveDefinition]) -> ResolverResult<ResolvedGraph> {
        let graph = self.module_graph(definitions)?;

        // Global universe: every module's external requests converge to one
        // version per coordinate.
        let mut direct = Vec::new();
        for definition in definitions {
            for dependency in &definition.dependencies {
                if graph.contains(&dependency.coordinate) {
                    continue;
                }
                direct.push(Request {
                    coordinate: dependency.coordinate.clone(),
                    spec: dependency.version.clone(),
                    scope: dependency.scope,
                    requester: definition.coordinate.to_string(),
                });
            }
        }
        let pins = self.converge(direct)?;
        let trees = build_trees(&pins);

        // Per-module flat sets in topological order, so runtime dependencies
        // of a module dependency are available when its dependents ask.
        let order = graph.topological_order()?;
        let mut modules: BTreeMap<Coordinate, ModuleResolution> = BTreeMap::new();
        for id in order {
            let coordinate = graph.coordinate(id).clone();
            let definition = definitions
                .iter()
                .find(|d| d.coordinate == coordinate)
                .ok_or_else(|| ResolverError::component(&coordinate, "definition missing"))?;

            let mut components: BTreeMap<Coordinate, ResolvedComponent> = BTreeMap::new();
            for dependency in &definition.dependencies {
                if graph.contains(&dependency.coordinate) {
                    continue;
                }
                if let Some(tree) = trees.get(&dependency.coordinate) {
                    components.insert(dependency.coordinate.clone(), tree.clone());
                }
            }
            for &dep_module in graph.dependencies_of(id) {
                let dep_coordinate = graph.coordinate(dep_module);
                if let Some(resolution) = modules.get(dep_coordinate) {
                    for component in resolution.dependencies.runtime() {
                        components
                            .entry(component.coordinate.clone())
                            .or_insert_with(|| (*component).clone());
                    }
                }
            }

            let plugins = self.resolve_plugins(definition)?;
            modules.insert(
                coordinate,
                ModuleResolution {
                    dependencies: ResolvedSet {
                        components: components.into_values().collect(),
                    },
                    plugins,
                },
            );
        }

        Ok(ResolvedGraph { graph, modules })
    }

    /// Build and validate the module graph from declared module-to-module
    /// dependencies.
    fn module_graph(&self, definitions: &[EffectiveDefinition]) -> ResolverResult<ModuleGraph> {
        let mut graph = ModuleGraph::new();
        for definition in definitions {
            graph.add_module(definition.coordinate.clone());
        }
        for definition in definitions {
            for dependency in &definition.dependencies {
                let Some(to) = graph.index_of(&dependency.coordinate) else {
                    continue;
                };
                let from = graph
                    .index_of(&definition.coordinate)
                    .ok_or_else(|| ResolverError::component(&definition.coordinate, "missing node"))?;
                if let Some(target) = definitions
                    .iter()
                    .find(|d| d.coordinate == dependency.coordinate)
                {
                    if !dependency.version.matches(&target.version) {
                        warn!(
                            "module {} requests {} at {}, in-scope version is {}",
                            definition.coordinate,
                            dependency.coordinate,
                            dependency.version,
                            target.version
                        );
                    }
                }
                graph.add_edge(from, to);
            }
        }
        graph.ensure_acyclic()?;
        Ok(graph)
    }

    /// Resolve each plugin binding in its own isolated universe
    fn resolve_plugins(
        &self,
        definition: &EffectiveDefinition,
    ) -> ResolverResult<Vec<ResolvedPlugin>> {
        let mut plugins = Vec::new();
        for binding in &definition.plugins {
            let version = self.pin_plugin_version(binding, &definition.coordinate)?;
            let descriptor = self.source.descriptor(&binding.coordinate, &version)?;
            let direct = descriptor
                .dependencies
                .iter()
                .map(|dep| Request {
                    coordinate: dep.coordinate(),
                    spec: VersionSpec::Exact(dep.version.clone()),
                    scope: Scope::Runtime,
                    requester: format!("{}@{}", binding.coordinate, version),
                })
                .collect();
            let pins = self.converge(direct)?;
            let trees = build_trees(&pins);
            let components = descriptor
                .dependencies
                .iter()
                .filter_map(|dep| trees.get(&dep.coordinate()).cloned())
                .collect();
            debug!(
                "plugin {}@{} resolved with {} direct dependencies",
                binding.coordinate,
                version,
                descriptor.dependencies.len()
            );
            plugins.push(ResolvedPlugin {
                binding: binding.clone(),
                version,
                dependencies: ResolvedSet { components },
            });
        }
        Ok(plugins)
    }

    /// Pin a plugin binding to a concrete version
    fn pin_plugin_version(
        &self,
        binding: &PluginBinding,
        module: &Coordinate,
    ) -> ResolverResult<Version> {
        let request = Request {
            coordinate: binding.coordinate.clone(),
            spec: binding.version.clone(),
            scope: Scope::Build,
            requester: module.to_string(),
        };
        select_version(
            self.source,
            &binding.coordinate,
            std::slice::from_ref(&request),
        )
    }

    /// Run version selection and transitive expansion to a fixed point
    fn converge(&self, direct: Vec<Request>) -> ResolverResult<BTreeMap<Coordinate, Pin>> {
        let mut pins: BTreeMap<Coordinate, Pin> = BTreeMap::new();

        for round in 0..FIXED_POINT_LIMIT {
            // Request multiset for this round: the declared requests plus
            // every pinned component's descriptor dependencies.
            let mut requests: BTreeMap<Coordinate, Vec<Request>> = BTreeMap::new();
            for request in &direct {
                requests
                    .entry(request.coordinate.clone())
                    .or_default()
                    .push(request.clone());
            }
            for (coordinate, pin) in &pins {
                for dep in &pin.dependencies {
                    requests
                        .entry(dep.coordinate())
                        .or_default()
                        .push(Request {
                            coordinate: dep.coordinate(),
                            spec: VersionSpec::Exact(dep.version.clone()),
                            scope: pin.scope,
                            requester: format!("{}@{}", coordinate, pin.version),
                        });
                }
            }

            let mut next: BTreeMap<Coordinate, Pin> = BTreeMap::new();
            for (coordinate, group) in &requests {
                let version = select_version(self.source, coordinate, group)?;
                let scope = group
                    .iter()
                    .fold(Scope::Build, |acc, request| acc.merge(request.scope));
                let descriptor = match pins.get(coordinate) {
                    Some(pin) if pin.version == version => pin.dependencies.clone(),
                    _ => self
                        .source
                        .descriptor(coordinate, &version)?
                        .dependencies,
                };
                next.insert(
                    coordinate.clone(),
                    Pin {
                        version,
                        scope,
                        dependencies: descriptor,
                    },
                );
            }

            let stable = next == pins;
            pins = next;
            if stable {
                debug!("resolution converged after {} rounds", round + 1);
                ensure_component_acyclicity(&pins)?;
                return Ok(pins);
            }
        }

        Err(ResolverError::Diverged {
            limit: FIXED_POINT_LIMIT,
        })
    }
}

/// A converged (version, scope, direct dependencies) entry for one
/// coordinate
#[derive(Debug, Clone, PartialEq)]
struct Pin {
    version: Version,
    scope: Scope,
    dependencies: Vec<trellis_model::DescriptorDependency>,
}

/// Reject component graphs with cycles, reusing the module graph arena
fn ensure_component_acyclicity(pins: &BTreeMap<Coordinate, Pin>) -> ResolverResult<()> {
    let mut graph = ModuleGraph::new();
    for coordinate in pins.keys() {
        graph.add_module(coordinate.clone());
    }
    for (coordinate, pin) in pins {
        let from = graph
            .index_of(coordinate)
            .ok_or_else(|| ResolverError::component(coordinate, "missing node"))?;
        for dep in &pin.dependencies {
            if let Some(to) = graph.index_of(&dep.coordinate()) {
                graph.add_edge(from, to);
            }
        }
    }
    graph.ensure_acyclic()?;
    Ok(())
}

/// Build one owned component tree per pinned coordinate
fn build_trees(pins: &BTreeMap<Coordinate, Pin>) -> BTreeMap<Coordinate, ResolvedComponent> {
    let mut trees = BTreeMap::new();
    for coordinate in pins.keys() {
        build_tree(coordinate, pins, &mut trees);
    }
    trees
}

fn build_tree(
    coordinate: &Coordinate,
    pins: &BTreeMap<Coordinate, Pin>,
    trees: &mut BTreeMap<Coordinate, ResolvedComponent>,
) -> Option<ResolvedComponent> {
    if let Some(tree) = trees.get(coordinate) {
        return Some(tree.clone());
    }
    let pin = pins.get(coordinate)?;
    let dependencies = pin
        .dependencies
        .iter()
        .filter_map(|dep| build_tree(&dep.coordinate(), pins, trees))
        .collect();
    let tree = ResolvedComponent {
        coordinate: coordinate.clone(),
        version: pin.version.clone(),
        scope: pin.scope,
        dependencies,
    };
    trees.insert(coordinate.clone(), tree.clone());
    Some(tree)
}
