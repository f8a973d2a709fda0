//! Workflow definition lookup.
//!
//! Definitions are validated on the way in and are immutable afterwards:
//! `create` never overwrites, so every execution keeps seeing the graph it
//! was started from.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use db::{DbError, DbPool};
use db::repository::workflows as wf_repo;

use crate::dag::validate_definition;
use crate::error::DefinitionStoreError;
use crate::models::WorkflowDefinition;

#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Fetch a definition by workflow name.
    async fn get(&self, name: &str) -> Result<WorkflowDefinition, DefinitionStoreError>;

    /// Validate and register a new definition.
    async fn create(&self, definition: WorkflowDefinition) -> Result<(), DefinitionStoreError>;

    /// All definitions, ordered by name.
    async fn list(&self) -> Result<Vec<WorkflowDefinition>, DefinitionStoreError>;

    async fn delete(&self, name: &str) -> Result<(), DefinitionStoreError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local definitions.
#[derive(Debug, Clone, Default)]
pub struct MemoryDefinitions {
    definitions: Arc<RwLock<BTreeMap<String, WorkflowDefinition>>>,
}

impl MemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitions {
    async fn get(&self, name: &str) -> Result<WorkflowDefinition, DefinitionStoreError> {
        self.definitions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| DefinitionStoreError::NotFound(name.to_owned()))
    }

    async fn create(&self, definition: WorkflowDefinition) -> Result<(), DefinitionStoreError> {
        validate_definition(&definition)?;

        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.name) {
            return Err(DefinitionStoreError::AlreadyExists(definition.name));
        }
        info!(workflow = %definition.name, tasks = definition.tasks.len(), "Registered workflow");
        definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, DefinitionStoreError> {
        Ok(self.definitions.read().await.values().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<(), DefinitionStoreError> {
        self.definitions
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DefinitionStoreError::NotFound(name.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Definitions stored as JSONB in the `workflows` table.
#[derive(Debug, Clone)]
pub struct PgDefinitions {
    pool: DbPool,
}

impl PgDefinitions {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_db_error(name: &str) -> impl FnOnce(DbError) -> DefinitionStoreError + '_ {
    move |err| match err {
        DbError::NotFound => DefinitionStoreError::NotFound(name.to_owned()),
        DbError::AlreadyExists(existing) => DefinitionStoreError::AlreadyExists(existing),
        other => DefinitionStoreError::Database(other),
    }
}

#[async_trait]
impl DefinitionStore for PgDefinitions {
    async fn get(&self, name: &str) -> Result<WorkflowDefinition, DefinitionStoreError> {
        let row = wf_repo::get_workflow(&self.pool, name)
            .await
            .map_err(map_db_error(name))?;
        Ok(serde_json::from_value(row.definition)?)
    }

    async fn create(&self, definition: WorkflowDefinition) -> Result<(), DefinitionStoreError> {
        validate_definition(&definition)?;

        let json = serde_json::to_value(&definition)?;
        wf_repo::create_workflow(&self.pool, &definition.name, json)
            .await
            .map_err(map_db_error(&definition.name))?;
        info!(workflow = %definition.name, tasks = definition.tasks.len(), "Registered workflow");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, DefinitionStoreError> {
        wf_repo::list_workflows(&self.pool)
            .await?
            .into_iter()
            .map(|row| {
                serde_json::from_value::<WorkflowDefinition>(row.definition)
                    .map_err(DefinitionStoreError::from)
            })
            .collect()
    }

    async fn delete(&self, name: &str) -> Result<(), DefinitionStoreError> {
        wf_repo::delete_workflow(&self.pool, name)
            .await
            .map_err(map_db_error(name))
    }
}
