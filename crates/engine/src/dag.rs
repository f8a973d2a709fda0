//! Definition validation and target closure, run before persisting anything.
//!
//! Rules enforced:
//! 1. The definition has at least one task.
//! 2. Task names must be unique within the definition.
//! 3. Every `requires` entry must name a task of the definition.
//! 4. The dependency graph must be acyclic (topological sort must succeed).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{DefinitionError, models::{Target, TaskSpec, WorkflowDefinition}};

/// Validate the definition's graph and return task names in topological
/// order (dependencies first). Ties keep definition order.
///
/// # Errors
/// - [`DefinitionError::Empty`] if there are no tasks.
/// - [`DefinitionError::DuplicateTask`] if two tasks share a name.
/// - [`DefinitionError::UnknownDependency`] if `requires` names a missing task.
/// - [`DefinitionError::CycleDetected`] if the graph is not acyclic.
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<Vec<String>, DefinitionError> {
    if definition.tasks.is_empty() {
        return Err(DefinitionError::Empty(definition.name.clone()));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for task in &definition.tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(DefinitionError::DuplicateTask(task.name.clone()));
        }
    }

    for task in &definition.tasks {
        for dependency in &task.requires {
            if !seen.contains(dependency.as_str()) {
                return Err(DefinitionError::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    // Kahn's algorithm over dependency -> dependant edges.
    let mut dependants: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for task in &definition.tasks {
        in_degree.insert(task.name.as_str(), task.requires.len());
        for dependency in &task.requires {
            dependants
                .entry(dependency.as_str())
                .or_default()
                .push(task.name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = definition
        .tasks
        .iter()
        .filter(|t| t.requires.is_empty())
        .map(|t| t.name.as_str())
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(definition.tasks.len());

    while let Some(name) = queue.pop_front() {
        sorted.push(name.to_owned());

        if let Some(next) = dependants.get(name) {
            for &dependant in next {
                let degree = in_degree.entry(dependant).or_insert(0);
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependant);
                }
            }
        }
    }

    // If we didn't visit every task the graph contains a cycle.
    if sorted.len() != definition.tasks.len() {
        return Err(DefinitionError::CycleDetected);
    }

    Ok(sorted)
}

/// Return the specs needed to reach `target`: the target itself plus its
/// transitive `requires` closure, in topological order. Tasks outside the
/// closure are never instantiated.
///
/// The whole definition is validated first, so a cyclic graph is rejected even
/// when the cycle lies outside the closure.
pub fn find_workflow_tasks<'d>(
    definition: &'d WorkflowDefinition,
    target: &Target,
) -> Result<Vec<&'d TaskSpec>, DefinitionError> {
    let order = validate_definition(definition)?;

    let needed: HashSet<&str> = match target {
        Target::AllTasks => definition.tasks.iter().map(|t| t.name.as_str()).collect(),
        Target::Task(name) => {
            let root = definition
                .task(name)
                .ok_or_else(|| DefinitionError::UnknownTask(name.clone()))?;

            let mut needed = HashSet::new();
            let mut stack = vec![root];
            while let Some(spec) = stack.pop() {
                if !needed.insert(spec.name.as_str()) {
                    continue;
                }
                for dependency in &spec.requires {
                    // Presence was checked by `validate_definition`.
                    if let Some(dep) = definition.task(dependency) {
                        stack.push(dep);
                    }
                }
            }
            needed
        }
    };

    Ok(order
        .iter()
        .filter(|name| needed.contains(name.as_str()))
        .filter_map(|name| definition.task(name))
        .collect())
}
