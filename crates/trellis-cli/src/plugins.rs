//! Built-in plugins
//!
//! The registry ships two first-party plugins: `clean` (empties a module's
//! output directory) and `resources` (copies a resource directory into the
//! output). Their descriptors are installed into the component repository
//! on startup so resolution treats them like any other component.

use log::debug;
use semver::Version;
use std::fs;
use std::path::PathBuf;
use trellis_model::{ComponentDescriptor, Coordinate, OptionKind, Stage};
use trellis_plugin::{
    HandlerError, HandlerResult, ModuleContext, OptionSpec, Plugin, PluginConfig, PluginRegistry,
    PluginResult, StageHandler, StageOutput,
};
use trellis_repository::{ComponentStore, LocalRepository, RepositoryResult};
use walkdir::WalkDir;

fn builtin_version() -> Version {
    Version::new(0, 1, 0)
}

fn clean_coordinate() -> Coordinate {
    Coordinate::new("io.trellis.plugins", "clean")
}

fn resources_coordinate() -> Coordinate {
    Coordinate::new("io.trellis.plugins", "resources")
}

/// The default registry with all built-in plugins
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(clean_coordinate(), CleanPlugin);
    registry.register(resources_coordinate(), ResourcesPlugin);
    registry
}

/// Install built-in plugin descriptors so the resolver can pin them
pub fn bootstrap(repository: &LocalRepository) -> RepositoryResult<()> {
    let version = builtin_version();
    for coordinate in [clean_coordinate(), resources_coordinate()] {
        if repository.has(&coordinate, &version) {
            continue;
        }
        debug!("bootstrapping built-in plugin {}@{}", coordinate, version);
        let descriptor = ComponentDescriptor::new(
            coordinate.group.clone(),
            coordinate.name.clone(),
            version.clone(),
        );
        repository.install(&coordinate, &version, &[], &descriptor)?;
    }
    Ok(())
}

struct CleanPlugin;

impl Plugin for CleanPlugin {
    fn handlers(&self, _config: &PluginConfig) -> PluginResult<Vec<Box<dyn StageHandler>>> {
        Ok(vec![Box::new(CleanHandler)])
    }
}

struct CleanHandler;

impl StageHandler for CleanHandler {
    fn name(&self) -> &str {
        "clean"
    }

    fn stage(&self) -> Stage {
        Stage::Clean
    }

    fn execute(&self, ctx: &ModuleContext) -> HandlerResult {
        match fs::remove_dir_all(&ctx.output_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HandlerError::from(e)),
        }
        fs::create_dir_all(&ctx.output_dir)?;
        Ok(StageOutput::none())
    }
}

struct ResourcesPlugin;

impl Plugin for ResourcesPlugin {
    fn options(&self) -> Vec<OptionSpec> {
        vec![OptionSpec::new("dir", OptionKind::Path).with_default("resources")]
    }

    fn handlers(&self, config: &PluginConfig) -> PluginResult<Vec<Box<dyn StageHandler>>> {
        let dir = config
            .path("dir")
            .unwrap_or_else(|| PathBuf::from("resources"));
        Ok(vec![Box::new(ResourcesHandler { dir })])
    }
}

struct ResourcesHandler {
    dir: PathBuf,
}

impl StageHandler for ResourcesHandler {
    fn name(&self) -> &str {
        "resources"
    }

    fn stage(&self) -> Stage {
        Stage::Resources
    }

    fn execute(&self, ctx: &ModuleContext) -> HandlerResult {
        let source = ctx.source_dir.join(&self.dir);
        if !source.is_dir() {
            return Ok(StageOutput::none());
        }

        let target = ctx.output_dir.join("resources");
        let mut outputs = Vec::new();
        for entry in WalkDir::new(&source).follow_links(false) {
            let entry = entry.map_err(|e| HandlerError::new(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&source)
                .map_err(|e| HandlerError::new(e.to_string()))?;
            let destination = target.join(relative);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
            outputs.push(destination);
        }
        Ok(StageOutput::files(outputs))
    }

    fn cache_inputs(&self, ctx: &ModuleContext) -> Option<Vec<PathBuf>> {
        let source = ctx.source_dir.join(&self.dir);
        if !source.is_dir() {
            return None;
        }
        let mut inputs = Vec::new();
        for entry in WalkDir::new(&source).follow_links(false) {
            let entry = entry.ok()?;
            if entry.file_type().is_file() {
                inputs.push(entry.path().to_path_buf());
            }
        }
        Some(inputs)
    }
}
