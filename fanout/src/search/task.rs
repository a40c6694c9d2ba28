//! Cancellable task handles.
//!
//! One [`CancellableTask`] is shared by every shard request of a logical
//! search. Cancellation is cooperative: executors poll
//! [`CancellableTask::ensure_not_cancelled`] at rewrite nodes, leaf
//! boundaries and every `cancellation_check_interval` documents, while async
//! code awaits [`CancellableTask::cancelled`].

use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub type TaskId = u64;

/// Reason recorded when a task's time budget runs out
pub const TIMEOUT_REASON: &str = "timeout";

#[derive(Debug)]
pub struct CancellableTask {
    id: TaskId,
    action: String,
    token: CancellationToken,
    reason: Mutex<Option<String>>,
    started: Instant,
    deadline: Option<Instant>,
}

impl CancellableTask {
    pub fn new(id: TaskId, action: impl Into<String>) -> Self {
        Self {
            id,
            action: action.into(),
            token: CancellationToken::new(),
            reason: Mutex::new(None),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// Attach a time budget; exceeding it cancels the task with reason "timeout"
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(self.started + timeout);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` when the task has no budget
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel the task. The first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(TIMEOUT_REASON);
                true
            }
            _ => false,
        }
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    pub fn timed_out(&self) -> bool {
        self.reason.lock().as_deref() == Some(TIMEOUT_REASON)
    }

    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::cancelled(
                self.reason().unwrap_or_else(|| "cancelled".to_string()),
            ));
        }
        Ok(())
    }

    /// Resolves once the task is cancelled or its deadline passes
    pub async fn cancelled(&self) {
        match self.remaining() {
            Some(remaining) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => self.cancel(TIMEOUT_REASON),
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Registry of in-flight tasks, so that a search can be cancelled by id
pub struct TaskRegistry {
    next_id: AtomicU64,
    tasks: RwLock<HashMap<TaskId, Arc<CancellableTask>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new task. It is removed again when the guard drops.
    pub fn register(
        self: &Arc<Self>,
        action: &str,
        timeout: Option<Duration>,
    ) -> TaskGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut task = CancellableTask::new(id, action);
        if let Some(timeout) = timeout {
            task = task.with_timeout(timeout);
        }
        let task = Arc::new(task);
        self.tasks.write().insert(id, task.clone());
        TaskGuard {
            registry: self.clone(),
            task,
        }
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<CancellableTask>> {
        self.tasks.read().get(&id).cloned()
    }

    /// Cancel a registered task, returning false if it is unknown
    pub fn cancel(&self, id: TaskId, reason: &str) -> bool {
        match self.get(id) {
            Some(task) => {
                task.cancel(reason);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    task: Arc<CancellableTask>,
}

impl TaskGuard {
    pub fn task(&self) -> &Arc<CancellableTask> {
        &self.task
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.tasks.write().remove(&self.task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_records_first_reason() {
        let task = CancellableTask::new(1, "search");
        assert!(task.ensure_not_cancelled().is_ok());

        task.cancel("user request");
        task.cancel("second");

        let err = task.ensure_not_cancelled().unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(task.reason().as_deref(), Some("user request"));
        assert!(!task.timed_out());
    }

    #[test]
    fn test_deadline_cancels_with_timeout_reason() {
        let task = CancellableTask::new(2, "search").with_timeout(Duration::ZERO);
        assert!(task.is_cancelled());
        assert!(task.timed_out());
        assert_eq!(task.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_cancel() {
        let task = Arc::new(CancellableTask::new(3, "search"));
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.cancelled().await })
        };
        task.cancel("stop");
        waiter.await.unwrap();
        assert!(task.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_deadline() {
        let task = CancellableTask::new(4, "search").with_timeout(Duration::from_millis(5));
        task.cancelled().await;
        assert!(task.timed_out());
    }

    #[test]
    fn test_registry_guard_removes_task() {
        let registry = Arc::new(TaskRegistry::new());
        let guard = registry.register("search", None);
        let id = guard.task().id();
        assert_eq!(registry.len(), 1);
        assert!(registry.cancel(id, "abort"));
        assert!(guard.task().is_cancelled());

        drop(guard);
        assert!(registry.is_empty());
        assert!(!registry.cancel(id, "abort"));
    }
}
