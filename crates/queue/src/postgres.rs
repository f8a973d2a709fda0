//! Durable dispatch queue backed by the `task_queue` Postgres table.
//!
//! Executors poll the table per queue name (e.g. with
//! `SELECT … FOR UPDATE SKIP LOCKED`) and delete rows once they have taken a
//! task. A batch is published in one transaction; nobody waits for a consumer.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgConnection;
use tracing::{debug, info};
use uuid::Uuid;

use db::DbPool;

use crate::{QueueError, TaskDispatcher, TaskMessage};

/// Publisher for one named queue.
#[derive(Debug, Clone)]
pub struct PgTaskQueue {
    pool: DbPool,
    queue: String,
}

impl PgTaskQueue {
    pub fn new(pool: DbPool, queue: impl Into<String>) -> Self {
        Self { pool, queue: queue.into() }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn publish_all(
        &self,
        conn: &mut PgConnection,
        messages: &[TaskMessage],
    ) -> Result<(), QueueError> {
        for message in messages {
            let payload = serde_json::to_value(message)?;

            sqlx::query(
                r#"
                INSERT INTO task_queue (id, queue, payload, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&self.queue)
            .bind(payload)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskDispatcher for PgTaskQueue {
    async fn dispatch(&self, messages: &[TaskMessage]) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }

        // All or nothing: a failed insert publishes no part of the batch.
        let mut tx = self.pool.begin().await?;
        debug!(queue = %self.queue, batch = messages.len(), "Publishing batch to task queue");

        self.publish_all(&mut tx, messages).await?;
        tx.commit().await?;

        for message in messages {
            info!(
                task_id = %message.task_id,
                task = %message.task_name,
                "Submitted task for execution"
            );
        }
        Ok(())
    }
}
