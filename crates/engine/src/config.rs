//! Tuning knobs for the coordinator.

use crate::models::TaskState;

/// When ready-task notifications are published relative to the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchOrder {
    /// Commit first, then publish. A publish failure is undone by a
    /// compensating transaction.
    #[default]
    AfterCommit,
    /// Publish, then commit. A crash or commit failure after publishing leaves
    /// executors working on tasks whose state was rolled back.
    BeforeCommit,
}

/// Which task failures end the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePropagation {
    /// Only an `ERROR` on the target task itself.
    #[default]
    TargetOnly,
    /// An `ERROR` on the target or on anything it transitively requires.
    Contagious,
}

/// Which task state changes a conveyed result may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any state may be written over any other.
    #[default]
    Permissive,
    /// Only `IDLE -> RUNNING`, `RUNNING -> SUCCESS | ERROR` and re-asserting
    /// the current state.
    Strict,
}

impl TransitionPolicy {
    pub fn allows(&self, from: TaskState, to: TaskState) -> bool {
        match self {
            Self::Permissive => true,
            Self::Strict => {
                from == to
                    || matches!(
                        (from, to),
                        (TaskState::Idle, TaskState::Running)
                            | (TaskState::Running, TaskState::Success)
                            | (TaskState::Running, TaskState::Error)
                    )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub dispatch_order: DispatchOrder,
    pub failure_propagation: FailurePropagation,
    pub transitions: TransitionPolicy,
    /// Write `ERROR`/`SUCCESS` on the execution when its target task decides
    /// the outcome. When `false`, a finished target ends processing without
    /// touching the execution row.
    pub finalize_on_target: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dispatch_order: DispatchOrder::AfterCommit,
            failure_propagation: FailurePropagation::TargetOnly,
            transitions: TransitionPolicy::Permissive,
            finalize_on_target: true,
        }
    }
}

impl CoordinatorConfig {
    /// Publish-before-commit, target-only failure, permissive transitions and
    /// no execution-state write on a finished target.
    pub fn reference() -> Self {
        Self {
            dispatch_order: DispatchOrder::BeforeCommit,
            failure_propagation: FailurePropagation::TargetOnly,
            transitions: TransitionPolicy::Permissive,
            finalize_on_target: false,
        }
    }
}
