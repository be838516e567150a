//! Build orchestration glue
//!
//! Cascade resolution, dependency resolution, plugin loading and the
//! scheduler run, in that order. Resolution or loading failures abort
//! before any stage executes.

use crate::plugins;
use crate::workspace::Workspace;
use anyhow::Context;
use log::info;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_model::{effective_definition, Stage};
use trellis_pipeline::{BuildReport, ModuleSpec, PipelineConfig, Scheduler};
use trellis_plugin::{PluginLoader, PluginRegistry, PluginRequest, StageHandler};
use trellis_repository::{ComponentStore, LocalRepository};
use trellis_resolver::{ResolvedSet, Resolver};

pub struct BuildOptions {
    pub stage: Stage,
    pub jobs: usize,
    pub fail_fast: bool,
    pub repository: PathBuf,
}

pub fn build(
    workspace: &Workspace,
    options: &BuildOptions,
    registry: &PluginRegistry,
) -> anyhow::Result<BuildReport> {
    let repository =
        LocalRepository::open(&options.repository).context("opening component repository")?;
    plugins::bootstrap(&repository).context("bootstrapping built-in plugins")?;

    let effectives = workspace
        .members
        .iter()
        .map(|member| effective_definition(&workspace.definitions, member))
        .collect::<Result<Vec<_>, _>>()
        .context("cascade resolution failed")?;

    let resolved = Resolver::new(&repository)
        .resolve(&effectives)
        .context("dependency resolution failed")?;
    info!("resolved {} modules", workspace.members.len());

    let loader = PluginLoader::new(registry);
    let mut modules: BTreeMap<_, ModuleSpec> = BTreeMap::new();
    for effective in &effectives {
        let resolution = resolved
            .module(&effective.coordinate)
            .with_context(|| format!("no resolution for module {}", effective.coordinate))?;

        let requests = resolution
            .plugins
            .iter()
            .map(|plugin| {
                Ok(PluginRequest {
                    coordinate: plugin.binding.coordinate.clone(),
                    version: plugin.version.clone(),
                    configuration: plugin.binding.configuration.clone(),
                    dependency_artifacts: artifact_paths(&repository, &plugin.dependencies)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let loaded = loader
            .load(&requests)
            .with_context(|| format!("loading plugins for {}", effective.coordinate))?;
        let handlers: Vec<Arc<dyn StageHandler>> = loaded
            .iter()
            .flat_map(|plugin| plugin.handlers.iter().cloned())
            .collect();

        let directory = workspace
            .directories
            .get(&effective.coordinate)
            .cloned()
            .unwrap_or_else(|| workspace.root.clone());
        let runtime_artifacts = runtime_artifact_paths(&repository, &resolution.dependencies)?;

        modules.insert(
            effective.coordinate.clone(),
            ModuleSpec::new(
                effective.coordinate.clone(),
                effective.version.clone(),
                directory.clone(),
                directory.join("target"),
            )
            .with_dependency_artifacts(runtime_artifacts)
            .with_handlers(handlers),
        );
    }

    let scheduler = Scheduler::new(PipelineConfig {
        jobs: options.jobs,
        fail_fast: options.fail_fast,
    });
    let report = scheduler.execute(&resolved.graph, &modules, options.stage)?;
    Ok(report)
}

/// Materialize every component of a resolved set as an artifact path
fn artifact_paths(
    repository: &LocalRepository,
    set: &ResolvedSet,
) -> anyhow::Result<Vec<PathBuf>> {
    set.flatten()
        .into_iter()
        .map(|component| {
            repository
                .artifact(&component.coordinate, &component.version)
                .with_context(|| format!("materializing {}", component.coordinate))
        })
        .collect()
}

/// Runtime-scoped artifact paths of a module's dependency set
fn runtime_artifact_paths(
    repository: &LocalRepository,
    set: &ResolvedSet,
) -> anyhow::Result<Vec<PathBuf>> {
    set.runtime()
        .into_iter()
        .map(|component| {
            repository
                .artifact(&component.coordinate, &component.version)
                .with_context(|| format!("materializing {}", component.coordinate))
        })
        .collect()
}
