pub mod executions;
pub mod tasks;
pub mod workflows;
