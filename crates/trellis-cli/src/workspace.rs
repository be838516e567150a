//! Workspace discovery
//!
//! A workspace root holds a `trellis.json` definition; its optional
//! `"modules"` listing names subdirectories carrying member definitions.
//! The root definition participates in cascade resolution (members usually
//! reference it as their parent) but is only built itself when no members
//! are listed.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use trellis_model::{Coordinate, ProjectDefinition};

const DEFINITION_FILE: &str = "trellis.json";

/// A trellis.json file: a project definition plus the workspace-level
/// member listing.
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(flatten)]
    definition: ProjectDefinition,
    #[serde(default)]
    modules: Vec<String>,
}

/// Discovered workspace: all definitions in scope, the members to build,
/// and each member's directory.
#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub definitions: BTreeMap<Coordinate, ProjectDefinition>,
    pub members: Vec<Coordinate>,
    pub directories: BTreeMap<Coordinate, PathBuf>,
}

pub fn load(root: &Path) -> anyhow::Result<Workspace> {
    let root_file = read_definition_file(&root.join(DEFINITION_FILE))?;
    let root_coordinate = root_file.definition.coordinate();

    let mut definitions = BTreeMap::new();
    let mut directories = BTreeMap::new();
    let mut members = Vec::new();

    directories.insert(root_coordinate.clone(), root.to_path_buf());
    definitions.insert(root_coordinate.clone(), root_file.definition);

    for module in &root_file.modules {
        let dir = root.join(module);
        let file = read_definition_file(&dir.join(DEFINITION_FILE))
            .with_context(|| format!("loading workspace member '{}'", module))?;
        let coordinate = file.definition.coordinate();
        directories.insert(coordinate.clone(), dir);
        definitions.insert(coordinate.clone(), file.definition);
        members.push(coordinate);
    }

    // Without members the root itself is the build scope.
    if members.is_empty() {
        members.push(root_coordinate);
    }

    Ok(Workspace {
        root: root.to_path_buf(),
        definitions,
        members,
        directories,
    })
}

fn read_definition_file(path: &Path) -> anyhow::Result<DefinitionFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading definition {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing definition {}", path.display()))
}
