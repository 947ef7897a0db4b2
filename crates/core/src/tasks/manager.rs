//! Task manager
//!
//! Tracks long-running remote operations in memory. Each task carries a
//! timeout timer; a recurring sweep removes terminal tasks once they have
//! been idle longer than the retention window.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use devicegate_common::time::{recurring, schedule_once, Clock, SystemClock, TimerHandle};
use devicegate_domain::{
    ErrorCode, GatewayError, GatewayResult, TaskFilter, TaskInfo, TaskSettings, TaskStats,
    TaskStatus, TaskType,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Callback receiving a task snapshot
pub type TaskCallback = Arc<dyn Fn(&TaskInfo) + Send + Sync>;

/// Callback receiving a task snapshot and the error recorded on it
pub type TaskErrorCallback = Arc<dyn Fn(&TaskInfo, &GatewayError) + Send + Sync>;

/// Per-task options for [`TaskManager::create_task`]
#[derive(Clone, Default)]
pub struct TaskOptions {
    /// Overrides the manager's default timeout
    pub timeout: Option<Duration>,
    /// Initial details
    pub details: Option<Value>,
    pub on_timeout: Option<TaskCallback>,
    pub on_complete: Option<TaskCallback>,
    pub on_error: Option<TaskErrorCallback>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn on_timeout(mut self, callback: impl Fn(&TaskInfo) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_complete(mut self, callback: impl Fn(&TaskInfo) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(
        mut self,
        callback: impl Fn(&TaskInfo, &GatewayError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("timeout", &self.timeout)
            .field("details", &self.details)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Task manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskManagerConfig {
    pub max_concurrent_tasks: usize,
    pub default_timeout: Duration,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self::from(&TaskSettings::default())
    }
}

impl From<&TaskSettings> for TaskManagerConfig {
    fn from(settings: &TaskSettings) -> Self {
        Self {
            max_concurrent_tasks: settings.max_concurrent_tasks,
            default_timeout: settings.default_timeout(),
            cleanup_interval: settings.cleanup_interval(),
            retention: settings.retention(),
        }
    }
}

struct TaskEntry {
    info: TaskInfo,
    /// Insertion order, breaks ties between equal creation times
    seq: u64,
    on_timeout: Option<TaskCallback>,
    on_complete: Option<TaskCallback>,
    on_error: Option<TaskErrorCallback>,
    timer: Option<TimerHandle>,
}

impl TaskEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

#[derive(Default)]
struct TaskTable {
    entries: HashMap<String, TaskEntry>,
    next_seq: u64,
}

struct Inner<C: Clock> {
    clock: Arc<C>,
    config: TaskManagerConfig,
    tasks: Mutex<TaskTable>,
    cleanup: Mutex<Option<TimerHandle>>,
}

impl<C: Clock> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(timer) = self.cleanup.get_mut().take() {
            timer.cancel();
        }
        for entry in self.tasks.get_mut().entries.values_mut() {
            entry.cancel_timer();
        }
    }
}

/// Deferred callback invocation, run after the table lock is released
enum Notification {
    Complete(TaskCallback, TaskInfo),
    Error(TaskErrorCallback, TaskInfo, GatewayError),
    Timeout(TaskCallback, TaskInfo),
}

impl Notification {
    fn dispatch(self) {
        match self {
            Self::Complete(callback, info) | Self::Timeout(callback, info) => callback(&info),
            Self::Error(callback, info, error) => callback(&info, &error),
        }
    }
}

/// Tracks asynchronous remote operations
///
/// Cloning is cheap; clones share the same table. Timers hold weak
/// references, so dropping every clone stops them.
pub struct TaskManager<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for TaskManager<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Clock> fmt::Debug for TaskManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl TaskManager<SystemClock> {
    #[must_use]
    pub fn new(config: TaskManagerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }
}

impl<C: Clock> TaskManager<C> {
    /// Create a task manager with a custom clock (useful for testing)
    #[must_use]
    pub fn with_clock(config: TaskManagerConfig, clock: Arc<C>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                config,
                tasks: Mutex::new(TaskTable::default()),
                cleanup: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.inner.config
    }

    /// Start tracking a task in `pending` state and arm its timeout
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `TASK_ALREADY_RUNNING` if `id` is already tracked
    /// - `TASK_LIMIT_EXCEEDED` if the table is full
    pub fn create_task(
        &self,
        id: impl Into<String>,
        task_type: TaskType,
        message: impl Into<String>,
        options: TaskOptions,
    ) -> GatewayResult<TaskInfo> {
        let id = id.into();
        let timeout = options.timeout.unwrap_or(self.inner.config.default_timeout);
        let mut table = self.inner.tasks.lock();

        if table.entries.contains_key(&id) {
            return Err(GatewayError::new(
                ErrorCode::TaskAlreadyRunning,
                format!("Task '{id}' already exists"),
            ));
        }
        let limit = self.inner.config.max_concurrent_tasks;
        if table.entries.len() >= limit {
            return Err(GatewayError::new(
                ErrorCode::TaskLimitExceeded,
                format!("Maximum number of tasks ({limit}) reached"),
            )
            .with_details(serde_json::json!({ "limit": limit })));
        }

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let now = self.inner.clock.utc_now();
        let mut info = TaskInfo::new(&id, task_type, message, timeout_ms, now);
        if let Some(details) = options.details {
            info.merge_details(details);
        }

        let timer = self.schedule_timeout(id.clone(), timeout);
        let seq = table.next_seq;
        table.next_seq += 1;
        table.entries.insert(
            id.clone(),
            TaskEntry {
                info: info.clone(),
                seq,
                on_timeout: options.on_timeout,
                on_complete: options.on_complete,
                on_error: options.on_error,
                timer: Some(timer),
            },
        );
        drop(table);

        info!(task_id = %id, task_type = %task_type, timeout_ms, "Task created");
        Ok(info)
    }

    /// Move a task to `status`, updating message, progress and details
    ///
    /// Returns `Ok(None)` (with a warning) for unknown ids.
    ///
    /// # Errors
    /// `TASK_INVALID_TRANSITION` if the state machine rejects the change.
    pub fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        message: Option<String>,
        progress: Option<i64>,
        details: Option<Value>,
    ) -> GatewayResult<Option<TaskInfo>> {
        let now = self.inner.clock.utc_now();
        let mut table = self.inner.tasks.lock();
        let Some(entry) = table.entries.get_mut(id) else {
            warn!(task_id = %id, "Status update for unknown task ignored");
            return Ok(None);
        };

        let previous = entry.info.status;
        entry.info.status = previous.transition(status)?;
        if let Some(message) = message {
            entry.info.message = message;
        }
        if let Some(progress) = progress {
            entry.info.set_progress(progress);
        }
        if let Some(details) = details {
            entry.info.merge_details(details);
        }
        entry.info.updated_at = now;

        let mut notification = None;
        if status.is_terminal() {
            entry.cancel_timer();
            match status {
                TaskStatus::Completed => {
                    notification = entry
                        .on_complete
                        .clone()
                        .map(|cb| Notification::Complete(cb, entry.info.clone()));
                }
                TaskStatus::Failed | TaskStatus::Cancelled => {
                    let error = GatewayError::internal(entry.info.message.clone())
                        .with_details(serde_json::json!({ "task_id": id, "status": status }));
                    entry.info.error = Some(error.clone());
                    notification = entry
                        .on_error
                        .clone()
                        .map(|cb| Notification::Error(cb, entry.info.clone(), error));
                }
                _ => {}
            }
        }
        let snapshot = entry.info.clone();
        drop(table);

        debug!(
            task_id = %id,
            from = %previous,
            to = %status,
            progress = snapshot.progress,
            "Task updated"
        );
        if let Some(notification) = notification {
            notification.dispatch();
        }
        Ok(Some(snapshot))
    }

    /// Snapshot of one task
    pub fn get_task(&self, id: &str) -> Option<TaskInfo> {
        self.inner.tasks.lock().entries.get(id).map(|entry| entry.info.clone())
    }

    /// Snapshots matching `filter`, oldest first
    pub fn get_tasks(&self, filter: &TaskFilter) -> Vec<TaskInfo> {
        let table = self.inner.tasks.lock();
        let mut matching: Vec<_> =
            table.entries.values().filter(|entry| filter.matches(&entry.info)).collect();
        matching.sort_by_key(|entry| (entry.info.created_at, entry.seq));
        matching.into_iter().map(|entry| entry.info.clone()).collect()
    }

    /// Cancel a non-terminal task
    ///
    /// Returns `Ok(false)` for unknown or already terminal tasks. Bookkeeping
    /// only: in-flight remote work is not aborted.
    pub fn cancel_task(&self, id: &str) -> GatewayResult<bool> {
        let cancellable = self.get_task(id).is_some_and(|task| !task.is_terminal());
        if !cancellable {
            return Ok(false);
        }
        let updated = self.update_task_status(
            id,
            TaskStatus::Cancelled,
            Some("Task cancelled".to_string()),
            None,
            None,
        )?;
        Ok(updated.is_some())
    }

    /// Remove a terminal task
    ///
    /// Returns `Ok(false)` for unknown ids.
    ///
    /// # Errors
    /// `TASK_ALREADY_RUNNING` if the task has not finished.
    pub fn delete_task(&self, id: &str) -> GatewayResult<bool> {
        let mut table = self.inner.tasks.lock();
        let Some(entry) = table.entries.get(id) else {
            return Ok(false);
        };
        if !entry.info.is_terminal() {
            return Err(GatewayError::new(
                ErrorCode::TaskAlreadyRunning,
                format!("Task '{id}' is still {}", entry.info.status),
            ));
        }
        table.entries.remove(id);
        debug!(task_id = %id, "Task deleted");
        Ok(true)
    }

    /// Counts per status
    pub fn stats(&self) -> TaskStats {
        let table = self.inner.tasks.lock();
        table.entries.values().fold(TaskStats::default(), |mut stats, entry| {
            stats.record(entry.info.status);
            stats
        })
    }

    /// Remove terminal tasks idle for longer than the retention window
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.utc_now();
        let retention = chrono::Duration::from_std(self.inner.config.retention)
            .unwrap_or(chrono::Duration::MAX);

        let mut table = self.inner.tasks.lock();
        let before = table.entries.len();
        table.entries.retain(|_, entry| {
            !(entry.info.is_terminal() && now - entry.info.updated_at > retention)
        });
        let removed = before - table.entries.len();
        drop(table);

        if removed > 0 {
            info!(removed, "Expired tasks cleaned up");
        }
        removed
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every cleanup interval
    pub fn start_cleanup(&self) {
        let weak = Arc::downgrade(&self.inner);
        let handle = recurring(self.inner.config.cleanup_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    TaskManager { inner }.cleanup_expired();
                }
            }
        });
        if let Some(previous) = self.inner.cleanup.lock().replace(handle) {
            previous.cancel();
        }
        debug!(
            interval_ms = u64::try_from(self.inner.config.cleanup_interval.as_millis())
                .unwrap_or(u64::MAX),
            "Task cleanup sweep started"
        );
    }

    /// Stop the sweep and cancel every non-terminal task
    ///
    /// Returns the number of tasks cancelled.
    pub fn shutdown(&self) -> usize {
        if let Some(timer) = self.inner.cleanup.lock().take() {
            timer.cancel();
        }

        let active: Vec<String> = {
            let table = self.inner.tasks.lock();
            table
                .entries
                .iter()
                .filter(|(_, entry)| !entry.info.is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut cancelled = 0;
        for id in &active {
            match self.cancel_task(id) {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(err) => warn!(task_id = %id, error = %err, "Failed to cancel task on shutdown"),
            }
        }
        info!(cancelled, "Task manager shut down");
        cancelled
    }

    fn schedule_timeout(&self, id: String, timeout: Duration) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        schedule_once(timeout, async move {
            if let Some(inner) = weak.upgrade() {
                TaskManager { inner }.expire(&id);
            }
        })
    }

    fn expire(&self, id: &str) {
        let now = self.inner.clock.utc_now();
        let mut table = self.inner.tasks.lock();
        let Some(entry) = table.entries.get_mut(id) else {
            return;
        };
        if entry.info.is_terminal() {
            return;
        }

        // Runs inside the timer task itself; dropping the handle would abort it
        if let Some(timer) = entry.timer.take() {
            timer.detach();
        }
        entry.info.status = TaskStatus::Timeout;
        entry.info.updated_at = now;
        entry.info.error = Some(
            GatewayError::timeout(format!("Task timed out after {}ms", entry.info.timeout_ms))
                .with_details(serde_json::json!({ "task_id": id })),
        );
        let notification =
            entry.on_timeout.clone().map(|cb| Notification::Timeout(cb, entry.info.clone()));
        drop(table);

        warn!(task_id = %id, "Task timed out");
        if let Some(notification) = notification {
            notification.dispatch();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for tasks::manager.
    use std::sync::atomic::{AtomicU32, Ordering};

    use devicegate_common::time::MockClock;
    use serde_json::json;

    use super::*;

    fn create_test_manager(max: usize) -> (TaskManager<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config =
            TaskManagerConfig { max_concurrent_tasks: max, ..TaskManagerConfig::default() };
        (TaskManager::with_clock(config, Arc::new(clock.clone())), clock)
    }

    fn counter() -> (Arc<AtomicU32>, impl Fn(&TaskInfo) + Send + Sync + 'static) {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &TaskInfo| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_task_starts_pending() {
        let (manager, _clock) = create_test_manager(10);
        let task = manager
            .create_task("b1", TaskType::Backup, "Backing up", TaskOptions::new())
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert_eq!(task.timeout_ms, 3_600_000);
        assert_eq!(manager.get_task("b1").unwrap().message, "Backing up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_rejected() {
        let (manager, _clock) = create_test_manager(10);
        manager.create_task("x", TaskType::Command, "", TaskOptions::new()).unwrap();

        let err = manager.create_task("x", TaskType::Command, "", TaskOptions::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskAlreadyRunning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_exceeded() {
        let (manager, _clock) = create_test_manager(2);
        manager.create_task("a", TaskType::Custom, "", TaskOptions::new()).unwrap();
        manager.create_task("b", TaskType::Custom, "", TaskOptions::new()).unwrap();

        let err = manager.create_task("c", TaskType::Custom, "", TaskOptions::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskLimitExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_clamped_and_details_merged() {
        let (manager, _clock) = create_test_manager(10);
        manager
            .create_task(
                "t",
                TaskType::Backup,
                "",
                TaskOptions::new().with_details(json!({ "device": "d1" })),
            )
            .unwrap();

        let task = manager
            .update_task_status("t", TaskStatus::Running, None, Some(-10), None)
            .unwrap()
            .unwrap();
        assert_eq!(task.progress, 0);

        let task = manager
            .update_task_status(
                "t",
                TaskStatus::Running,
                None,
                Some(150),
                Some(json!({ "step": 2 })),
            )
            .unwrap()
            .unwrap();
        assert_eq!(task.progress, 100);
        let details = task.details.unwrap();
        assert_eq!(details["device"], "d1");
        assert_eq!(details["step"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_task_update_is_noop() {
        let (manager, _clock) = create_test_manager(10);
        let result = manager.update_task_status("ghost", TaskStatus::Running, None, None, None);
        assert!(result.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once() {
        let (manager, _clock) = create_test_manager(10);
        let (timeouts, on_timeout) = counter();
        manager
            .create_task(
                "slow",
                TaskType::Command,
                "",
                TaskOptions::new().with_timeout(Duration::from_millis(100)).on_timeout(on_timeout),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let task = manager.get_task("slow").unwrap();
        assert_eq!(task.status, TaskStatus::Timeout);
        assert_eq!(task.error.unwrap().code, ErrorCode::NetworkTimeout);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_cancels_timeout() {
        let (manager, _clock) = create_test_manager(10);
        let (completions, on_complete) = counter();
        let (timeouts, on_timeout) = counter();
        manager
            .create_task(
                "fast",
                TaskType::Backup,
                "",
                TaskOptions::new()
                    .with_timeout(Duration::from_millis(100))
                    .on_complete(on_complete)
                    .on_timeout(on_timeout),
            )
            .unwrap();

        manager
            .update_task_status("fast", TaskStatus::Completed, Some("done".into()), Some(100), None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
        assert_eq!(manager.get_task("fast").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_invokes_on_error_with_message() {
        let (manager, _clock) = create_test_manager(10);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        manager
            .create_task(
                "f",
                TaskType::Restore,
                "",
                TaskOptions::new().on_error(move |_, err| {
                    *sink.lock() = Some(err.message.clone());
                }),
            )
            .unwrap();

        manager
            .update_task_status("f", TaskStatus::Failed, Some("disk full".into()), None, None)
            .unwrap();

        assert_eq!(seen.lock().as_deref(), Some("disk full"));
        assert_eq!(manager.get_task("f").unwrap().error.unwrap().message, "disk full");
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_transition_rejected() {
        let (manager, _clock) = create_test_manager(10);
        manager.create_task("t", TaskType::Command, "", TaskOptions::new()).unwrap();
        manager.update_task_status("t", TaskStatus::Cancelled, None, None, None).unwrap();

        let err = manager
            .update_task_status("t", TaskStatus::Completed, None, None, None)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskInvalidTransition);
        assert_eq!(manager.get_task("t").unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_task() {
        let (manager, _clock) = create_test_manager(10);
        manager.create_task("t", TaskType::Command, "", TaskOptions::new()).unwrap();

        assert!(manager.cancel_task("t").unwrap());
        assert!(!manager.cancel_task("t").unwrap());
        assert!(!manager.cancel_task("missing").unwrap());
        assert_eq!(manager.get_task("t").unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_only_terminal() {
        let (manager, _clock) = create_test_manager(10);
        manager.create_task("r", TaskType::Backup, "", TaskOptions::new()).unwrap();
        manager.update_task_status("r", TaskStatus::Running, None, Some(10), None).unwrap();

        let err = manager.delete_task("r").unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskAlreadyRunning);

        manager.update_task_status("r", TaskStatus::Completed, None, None, None).unwrap();
        assert!(manager.delete_task("r").unwrap());
        assert!(manager.get_tasks(&TaskFilter::new()).is_empty());
        assert!(!manager.delete_task("r").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_tasks_sorted_and_filtered() {
        let (manager, clock) = create_test_manager(10);
        manager.create_task("first", TaskType::Backup, "", TaskOptions::new()).unwrap();
        clock.advance_secs(1);
        manager.create_task("second", TaskType::Command, "", TaskOptions::new()).unwrap();
        clock.advance_secs(1);
        manager.create_task("third", TaskType::Backup, "", TaskOptions::new()).unwrap();

        let ids: Vec<_> =
            manager.get_tasks(&TaskFilter::new()).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["first", "second", "third"]);

        let backups = manager.get_tasks(&TaskFilter::new().with_type(TaskType::Backup));
        assert_eq!(backups.len(), 2);

        let stats = manager.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_old_terminal_tasks() {
        let (manager, clock) = create_test_manager(10);
        manager.create_task("old", TaskType::Backup, "", TaskOptions::new()).unwrap();
        manager.create_task("active", TaskType::Backup, "", TaskOptions::new()).unwrap();
        manager.update_task_status("old", TaskStatus::Completed, None, None, None).unwrap();

        clock.advance(Duration::from_secs(23 * 60 * 60));
        assert_eq!(manager.cleanup_expired(), 0);

        clock.advance(Duration::from_secs(2 * 60 * 60));
        assert_eq!(manager.cleanup_expired(), 1);
        assert!(manager.get_task("old").is_none());
        assert!(manager.get_task("active").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_active_tasks() {
        let (manager, _clock) = create_test_manager(10);
        manager.start_cleanup();
        manager.create_task("a", TaskType::Backup, "", TaskOptions::new()).unwrap();
        manager.create_task("b", TaskType::Backup, "", TaskOptions::new()).unwrap();
        manager.update_task_status("b", TaskStatus::Completed, None, None, None).unwrap();

        assert_eq!(manager.shutdown(), 1);
        assert_eq!(manager.get_task("a").unwrap().status, TaskStatus::Cancelled);
        assert_eq!(manager.get_task("b").unwrap().status, TaskStatus::Completed);
    }
}
