//! Task tracking types
//!
//! A task is a handle on a long-running remote operation that callers poll
//! rather than await.

use std::fmt;

use chrono::{DateTime, Utc};
use devicegate_common::error::{ErrorCode, GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Kind of remote operation a task tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Backup,
    Restore,
    Command,
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Command => "command",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle
///
/// ```text
/// pending ──► running ──► completed | failed | cancelled | timeout
///    └──────────────────► completed | failed | cancelled | timeout
/// ```
///
/// Terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout)
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (Self::Running, Self::Pending) => false,
            _ => true,
        }
    }

    /// Validate a transition, returning the new status
    pub fn transition(self, next: TaskStatus) -> GatewayResult<TaskStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(GatewayError::new(
                ErrorCode::TaskInvalidTransition,
                format!("Illegal task transition {self} -> {next}"),
            )
            .with_details(serde_json::json!({ "from": self, "to": next })))
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a tracked task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Always within `[0, 100]`
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
    pub timeout_ms: u64,
}

impl TaskInfo {
    pub fn new(
        id: impl Into<String>,
        task_type: TaskType,
        message: impl Into<String>,
        timeout_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            task_type,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            progress: 0,
            message: message.into(),
            details: None,
            error: None,
            timeout_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Store `progress` clamped to `[0, 100]`
    pub fn set_progress(&mut self, progress: i64) {
        self.progress = u8::try_from(progress.clamp(0, 100)).unwrap_or(100);
    }

    /// Merge `details` key by key; non-object values are stored under `"value"`
    pub fn merge_details(&mut self, details: Value) {
        let incoming = match details {
            Value::Object(map) => map,
            Value::Null => return,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.details.get_or_insert_with(Map::new).extend(incoming);
    }
}

/// Read-only query over tracked tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    #[must_use]
    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    #[must_use]
    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn matches(&self, task: &TaskInfo) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.task_type.map_or(true, |t| task.task_type == t)
            && self.created_after.map_or(true, |at| task.created_at >= at)
            && self.created_before.map_or(true, |at| task.created_at <= at)
    }
}

/// Counts of tracked tasks per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timeout: usize,
}

impl TaskStats {
    pub fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
            TaskStatus::Timeout => self.timeout += 1,
        }
    }

    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

/// Generate a time-ordered task id such as `backup-0190b7...`
pub fn generate_task_id(task_type: TaskType) -> String {
    format!("{task_type}-{}", Uuid::now_v7().simple())
}
