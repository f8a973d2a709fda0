//! Task repository functions.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::{
    DbError,
    models::{NewTask, TaskRow, TaskState},
};

/// Raw `tasks` row; `state` is stored as text.
#[derive(FromRow)]
struct TaskRecord {
    id: Uuid,
    execution_id: Uuid,
    workflow_name: String,
    name: String,
    state: String,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRecord> for TaskRow {
    type Error = DbError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            execution_id: record.execution_id,
            workflow_name: record.workflow_name,
            name: record.name,
            state: record.state.parse().map_err(DbError::Corrupt)?,
            result: record.result,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

const COLUMNS: &str =
    "id, execution_id, workflow_name, name, state, result, created_at, updated_at";

/// Insert one `IDLE` task per entry of `tasks`, preserving their order.
pub async fn create_tasks(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
    tasks: &[NewTask],
) -> Result<Vec<TaskRow>, DbError> {
    let now = Utc::now();
    let mut rows = Vec::with_capacity(tasks.len());

    for (position, task) in tasks.iter().enumerate() {
        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            r#"
            INSERT INTO tasks (id, execution_id, workflow_name, name, position, state, result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, $7, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(execution_id)
        .bind(workflow_name)
        .bind(&task.name)
        .bind(position as i32)
        .bind(TaskState::Idle.as_str())
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        rows.push(record.try_into()?);
    }

    Ok(rows)
}

/// List every task of an execution in creation order.
pub async fn list_tasks(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
) -> Result<Vec<TaskRow>, DbError> {
    let records = sqlx::query_as::<_, TaskRecord>(&format!(
        r#"
        SELECT {COLUMNS} FROM tasks
        WHERE workflow_name = $1 AND execution_id = $2
        ORDER BY position ASC
        "#
    ))
    .bind(workflow_name)
    .bind(execution_id)
    .fetch_all(&mut *conn)
    .await?;

    records.into_iter().map(TaskRow::try_from).collect()
}

/// Overwrite a task's state and result. No prior-state check happens here.
pub async fn update_task(
    conn: &mut PgConnection,
    workflow_name: &str,
    execution_id: Uuid,
    task_id: Uuid,
    state: TaskState,
    result: Option<serde_json::Value>,
) -> Result<TaskRow, DbError> {
    let record = sqlx::query_as::<_, TaskRecord>(&format!(
        r#"
        UPDATE tasks
        SET state = $1, result = $2, updated_at = $3
        WHERE workflow_name = $4 AND execution_id = $5 AND id = $6
        RETURNING {COLUMNS}
        "#
    ))
    .bind(state.as_str())
    .bind(result)
    .bind(Utc::now())
    .bind(workflow_name)
    .bind(execution_id)
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;

    record.try_into()
}
