//! Dependency resolver: pure functions over a snapshot of an execution's
//! tasks. No I/O.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::FailurePropagation;
use crate::models::{Target, Task, TaskState};

/// Whether a finished task satisfies the tasks that require it.
pub fn is_success_like(state: TaskState) -> bool {
    matches!(state, TaskState::Success)
}

/// Terminal outcome of an execution as seen from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Incomplete,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete => f.write_str("incomplete"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Tasks that may be dispatched now: `IDLE`, with every required task
/// success-like. Returned in snapshot order.
///
/// A task that has left `IDLE` is never returned again, so applying this to
/// the same snapshot twice yields the same tasks.
pub fn ready_tasks(tasks: &[Task]) -> Vec<&Task> {
    let states: HashMap<&str, TaskState> =
        tasks.iter().map(|t| (t.name.as_str(), t.state)).collect();

    tasks
        .iter()
        .filter(|t| t.state == TaskState::Idle)
        .filter(|t| {
            t.requires.iter().all(|dep| {
                states
                    .get(dep.as_str())
                    .is_some_and(|state| is_success_like(*state))
            })
        })
        .collect()
}

/// `true` when every task is success-like.
pub fn is_success(tasks: &[Task]) -> bool {
    !tasks.is_empty() && tasks.iter().all(|t| is_success_like(t.state))
}

/// Local check against the target only; cheap and short-circuits on failure.
///
/// For a single-task target: `Failed` once the target is `ERROR` (or, with
/// [`FailurePropagation::Contagious`], once any task it transitively requires
/// is), `Succeeded` once the target is success-like. For
/// [`Target::AllTasks`] every task is the target.
pub fn target_outcome(tasks: &[Task], target: &Target, propagation: FailurePropagation) -> Outcome {
    match target {
        Target::AllTasks => {
            if tasks.iter().any(|t| t.state == TaskState::Error) {
                Outcome::Failed
            } else if is_success(tasks) {
                Outcome::Succeeded
            } else {
                Outcome::Incomplete
            }
        }
        Target::Task(name) => {
            let Some(target_task) = tasks.iter().find(|t| &t.name == name) else {
                return Outcome::Incomplete;
            };

            if target_task.state == TaskState::Error {
                return Outcome::Failed;
            }
            if propagation == FailurePropagation::Contagious
                && ancestors(tasks, target_task)
                    .iter()
                    .any(|t| t.state == TaskState::Error)
            {
                return Outcome::Failed;
            }
            if is_success_like(target_task.state) {
                return Outcome::Succeeded;
            }
            Outcome::Incomplete
        }
    }
}

/// Full completion check: the target check first, then whole-graph success.
pub fn is_execution_complete(
    tasks: &[Task],
    target: &Target,
    propagation: FailurePropagation,
) -> Outcome {
    match target_outcome(tasks, target, propagation) {
        Outcome::Incomplete if is_success(tasks) => Outcome::Succeeded,
        outcome => outcome,
    }
}

/// Every task `task` transitively requires, within this snapshot.
fn ancestors<'t>(tasks: &'t [Task], task: &'t Task) -> Vec<&'t Task> {
    let by_name: HashMap<&str, &Task> = tasks.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut found = Vec::new();
    let mut stack: Vec<&str> = task.requires.iter().map(String::as_str).collect();

    while let Some(name) = stack.pop() {
        if !seen.insert(name) {
            continue;
        }
        if let Some(dep) = by_name.get(name) {
            found.push(*dep);
            stack.extend(dep.requires.iter().map(String::as_str));
        }
    }
    found
}
