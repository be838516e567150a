//! Build run reporting

use crate::state::ModuleState;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use trellis_model::{Coordinate, Stage};

/// The first fatal stage failure of a run
#[derive(Debug, Clone)]
pub struct BuildFailure {
    pub module: Coordinate,
    pub stage: Stage,
    pub handler: String,
    pub message: String,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} failed at stage {} (task '{}'): {}",
            self.module, self.stage, self.handler, self.message
        )
    }
}

/// Terminal record for one module
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub state: ModuleState,
    /// Outputs recorded per executed stage
    pub outputs: BTreeMap<Stage, Vec<PathBuf>>,
}

/// Result of one build run. The run is a success only if every module
/// reached `Completed`; a failed or skipped module never reports success.
#[derive(Debug)]
pub struct BuildReport {
    pub modules: BTreeMap<Coordinate, ModuleOutcome>,
    pub first_failure: Option<BuildFailure>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.modules
            .values()
            .all(|outcome| outcome.state == ModuleState::Completed)
    }

    pub fn state_of(&self, module: &Coordinate) -> Option<ModuleState> {
        self.modules.get(module).map(|outcome| outcome.state)
    }

    /// Modules that failed, directly or through a failed dependency
    pub fn failed(&self) -> Vec<&Coordinate> {
        self.modules
            .iter()
            .filter(|(_, outcome)| outcome.state == ModuleState::Failed)
            .map(|(coordinate, _)| coordinate)
            .collect()
    }

    /// Modules never driven to a terminal state (skipped by cancellation)
    pub fn skipped(&self) -> Vec<&Coordinate> {
        self.modules
            .iter()
            .filter(|(_, outcome)| !outcome.state.is_terminal())
            .map(|(coordinate, _)| coordinate)
            .collect()
    }

    pub fn completed(&self) -> Vec<&Coordinate> {
        self.modules
            .iter()
            .filter(|(_, outcome)| outcome.state == ModuleState::Completed)
            .map(|(coordinate, _)| coordinate)
            .collect()
    }
}
