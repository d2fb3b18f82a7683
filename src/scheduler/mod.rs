//! Durable single-shot task queue
//!
//! Long-running work (bulk import batches) is never a loop in process
//! memory. Each step schedules its continuation here as a
//! [`ScheduledTask`] with a `run_after` time and a handler key, and a
//! runner later takes the due tasks and dispatches them by key.
//!
//! The queue is either in-memory or mirrored to a JSON file, so pending
//! continuations survive a restart.
//!
//! # Example
//!
//! ```no_run
//! use chiral_hub::scheduler::{ScheduledTask, TaskQueue};
//! use chrono::{Duration, Utc};
//!
//! # async fn example() -> chiral_hub::scheduler::error::SchedulerResult<()> {
//! let queue = TaskQueue::open("./state/tasks.json").await?;
//! queue
//!     .schedule(ScheduledTask::new(
//!         "sitemap_import_batch",
//!         serde_json::json!({"node_id": "N1"}),
//!         Utc::now() + Duration::seconds(5),
//!     ))
//!     .await?;
//!
//! for task in queue.take_due(Utc::now()).await? {
//!     println!("running {}", task.handler);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{SchedulerError, SchedulerResult};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// One deferred invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub run_after: DateTime<Utc>,
    /// Key of the handler that runs this task
    pub handler: String,
    pub args: Value,
}

impl ScheduledTask {
    pub fn new(handler: &str, args: Value, run_after: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_after,
            handler: handler.to_string(),
            args,
        }
    }

    /// Task that runs `delay` from now
    pub fn after(handler: &str, args: Value, delay: Duration) -> Self {
        Self::new(handler, args, Utc::now() + delay)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_after <= now
    }

    /// String argument by name
    pub fn arg_str(&self, name: &str) -> SchedulerResult<&str> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| SchedulerError::invalid_args(&self.handler, format!("missing '{name}'")))
    }
}

/// Pending tasks, optionally persisted to a JSON file
pub struct TaskQueue {
    tasks: RwLock<Vec<ScheduledTask>>,

    /// Queue file path (optional)
    queue_file: Option<PathBuf>,
}

impl TaskQueue {
    /// Create an in-memory queue
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(Vec::new()),
            queue_file: None,
        }
    }

    /// Open a queue persisted at `path`, loading pending tasks
    pub async fn open(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tasks = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| SchedulerError::queue_io("open_queue", e.to_string()))?
        {
            let json = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| SchedulerError::queue_io("load_queue", e.to_string()))?;
            serde_json::from_str(&json)?
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SchedulerError::queue_io("create_queue_dir", e.to_string()))?;
            }
            Vec::new()
        };

        Ok(Self {
            tasks: RwLock::new(tasks),
            queue_file: Some(path),
        })
    }

    /// Add a task; returns its id
    pub async fn schedule(&self, task: ScheduledTask) -> SchedulerResult<String> {
        let mut tasks = self.tasks.write().await;
        let id = task.id.clone();
        tracing::debug!(
            task_id = %id,
            handler = %task.handler,
            run_after = %task.run_after,
            "Task scheduled"
        );
        tasks.push(task);
        self.persist(&tasks).await?;
        Ok(id)
    }

    /// Add a task unless one with the same handler and args is pending
    ///
    /// Returns the id of the pending or newly added task.
    pub async fn schedule_unique(&self, task: ScheduledTask) -> SchedulerResult<String> {
        let mut tasks = self.tasks.write().await;
        if let Some(existing) = tasks
            .iter()
            .find(|t| t.handler == task.handler && t.args == task.args)
        {
            return Ok(existing.id.clone());
        }
        let id = task.id.clone();
        tasks.push(task);
        self.persist(&tasks).await?;
        Ok(id)
    }

    /// Remove and return every task due at `now`, earliest first
    pub async fn take_due(&self, now: DateTime<Utc>) -> SchedulerResult<Vec<ScheduledTask>> {
        let mut tasks = self.tasks.write().await;
        let (mut due, pending): (Vec<_>, Vec<_>) = tasks.drain(..).partition(|t| t.is_due(now));
        *tasks = pending;

        if !due.is_empty() {
            self.persist(&tasks).await?;
        }
        due.sort_by_key(|t| t.run_after);
        Ok(due)
    }

    /// Drop pending tasks of `handler` whose `args[key]` equals `value`
    pub async fn cancel(&self, handler: &str, key: &str, value: &str) -> SchedulerResult<usize> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| !(t.handler == handler && t.args.get(key).and_then(Value::as_str) == Some(value)));
        let removed = before - tasks.len();

        if removed > 0 {
            self.persist(&tasks).await?;
            tracing::debug!(handler = %handler, key = %key, value = %value, removed, "Tasks cancelled");
        }
        Ok(removed)
    }

    /// Snapshot of pending tasks
    pub async fn pending(&self) -> Vec<ScheduledTask> {
        self.tasks.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    async fn persist(&self, tasks: &[ScheduledTask]) -> SchedulerResult<()> {
        let Some(ref path) = self.queue_file else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(tasks)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| SchedulerError::queue_io("save_queue", e.to_string()))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| SchedulerError::queue_io("save_queue", e.to_string()))?;
        Ok(())
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
