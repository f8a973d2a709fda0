//! Execution repository functions.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionRow, ExecutionState},
};

/// Raw `executions` row; `state` is stored as text.
#[derive(FromRow)]
struct ExecutionRecord {
    id: Uuid,
    workflow_name: String,
    target_task: String,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRecord> for ExecutionRow {
    type Error = DbError;

    fn try_from(record: ExecutionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            workflow_name: record.workflow_name,
            target_task: record.target_task,
            state: record.state.parse().map_err(DbError::Corrupt)?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

const COLUMNS: &str = "id, workflow_name, target_task, state, created_at, updated_at";

/// Create a new execution record in `RUNNING` state.
pub async fn create_execution(
    conn: &mut PgConnection,
    workflow_name: &str,
    target_task: &str,
) -> Result<ExecutionRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let record = sqlx::query_as::<_, ExecutionRecord>(&format!(
        r#"
        INSERT INTO executions (id, workflow_name, target_task, state, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(workflow_name)
    .bind(target_task)
    .bind(ExecutionState::Running.as_str())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    record.try_into()
}

/// Fetch one execution of `workflow_name`.
///
/// With `for_update` the row stays locked until the surrounding transaction
/// ends, which serialises every writer of the same execution.
pub async fn get_execution(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
    for_update: bool,
) -> Result<ExecutionRow, DbError> {
    let lock = if for_update { "FOR UPDATE" } else { "" };

    let record = sqlx::query_as::<_, ExecutionRecord>(&format!(
        "SELECT {COLUMNS} FROM executions WHERE workflow_name = $1 AND id = $2 {lock}"
    ))
    .bind(workflow_name)
    .bind(execution_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;

    record.try_into()
}

/// Update the `state` of an execution.
pub async fn update_execution_state(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
    state: ExecutionState,
) -> Result<ExecutionRow, DbError> {
    let record = sqlx::query_as::<_, ExecutionRecord>(&format!(
        r#"
        UPDATE executions
        SET state = $1, updated_at = $2
        WHERE workflow_name = $3 AND id = $4
        RETURNING {COLUMNS}
        "#
    ))
    .bind(state.as_str())
    .bind(Utc::now())
    .bind(workflow_name)
    .bind(execution_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;

    record.try_into()
}

/// Delete an execution; its tasks go with it (`ON DELETE CASCADE`).
pub async fn delete_execution(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM executions WHERE workflow_name = $1 AND id = $2")
        .bind(workflow_name)
        .bind(execution_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
