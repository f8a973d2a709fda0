//! In-process dispatch channel.
//!
//! Useful in tests and for running the coordinator without a database. The
//! queue can be switched to "unavailable" to exercise publish failures.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::{QueueError, TaskDispatcher, TaskMessage, DEFAULT_QUEUE};

/// Shared, cloneable in-memory queue. Clones observe the same messages.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    messages: Arc<Mutex<VecDeque<TaskMessage>>>,
    unavailable: Arc<AtomicBool>,
    batches: Arc<AtomicUsize>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `dispatch` fail without publishing anything.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of messages waiting to be consumed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of non-empty batches accepted so far.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Take every waiting message, oldest first.
    pub fn drain(&self) -> Vec<TaskMessage> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<TaskMessage>> {
        // A poisoned queue still holds valid messages.
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TaskDispatcher for MemoryQueue {
    async fn dispatch(&self, messages: &[TaskMessage]) -> Result<(), QueueError> {
        if messages.is_empty() {
            return Ok(());
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable {
                queue: DEFAULT_QUEUE.to_owned(),
                message: "connection refused".to_owned(),
            });
        }

        let mut queue = self.lock();
        for message in messages {
            info!(task_id = %message.task_id, task = %message.task_name, "Submitted task for execution");
            queue.push_back(message.clone());
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
