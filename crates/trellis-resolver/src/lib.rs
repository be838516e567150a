//! Trellis dependency resolution
//!
//! Turns declared module, external and plugin dependencies into a
//! consistent, conflict-resolved graph: highest-requested-version-wins
//! selection, fixed-point transitive expansion through component
//! descriptors, scope merging, and cycle rejection. Resolution is
//! deterministic: identical inputs always produce an identical resolved
//! graph.

pub mod graph;
pub mod resolver;

pub use graph::{GraphError, ModuleGraph, ModuleNode};
pub use resolver::{
    ComponentSource, ModuleResolution, Request, ResolvedComponent, ResolvedGraph, ResolvedPlugin,
    ResolvedSet, Resolver, ResolverError, ResolverResult,
};
