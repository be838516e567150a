//! Per-module build state machine

use trellis_model::Stage;

/// State of one module during a build run:
/// `Pending → Running(stage) → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Not dispatched yet, or skipped by cancellation
    Pending,
    /// The most recently dispatched stage
    Running(Stage),
    /// Every planned stage finished
    Completed,
    /// A stage failed, or a dependency module failed
    Failed,
}

impl ModuleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
