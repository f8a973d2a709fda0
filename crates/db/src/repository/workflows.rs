//! Workflow definition CRUD operations.

use chrono::Utc;
use sqlx::PgPool;

use crate::{DbError, models::WorkflowRow};

/// Insert a new workflow definition.
///
/// `definition` must be a valid JSON object produced by serialising the
/// domain `WorkflowDefinition` type from the `engine` crate. Names are unique;
/// an existing name yields [`DbError::AlreadyExists`] and is left untouched.
pub async fn create_workflow(
    pool: &PgPool,
    name: &str,
    definition: serde_json::Value,
) -> Result<WorkflowRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflows (name, definition, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        RETURNING name, definition, created_at
        "#,
    )
    .bind(name)
    .bind(definition)
    .bind(now)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::AlreadyExists(name.to_owned()))?;

    Ok(row)
}

/// Fetch a single workflow by name.
pub async fn get_workflow(pool: &PgPool, name: &str) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT name, definition, created_at FROM workflows WHERE name = $1"#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Return all workflows ordered by name.
pub async fn list_workflows(pool: &PgPool) -> Result<Vec<WorkflowRow>, DbError> {
    let rows = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT name, definition, created_at FROM workflows ORDER BY name ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Permanently delete a workflow by name.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_workflow(pool: &PgPool, name: &str) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM workflows WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
