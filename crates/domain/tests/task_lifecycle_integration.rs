//! Integration tests for the task state machine
//!
//! Walks realistic task histories through `TaskStatus::transition` and checks
//! filtering over the resulting snapshots.

use chrono::{Duration, Utc};
use devicegate_domain::{ErrorCode, TaskFilter, TaskInfo, TaskStats, TaskStatus, TaskType};

/// A backup reports progress, completes, and then rejects late updates.
#[test]
fn test_backup_history_is_monotonic() {
    let mut status = TaskStatus::Pending;
    for next in [TaskStatus::Running, TaskStatus::Running, TaskStatus::Completed] {
        status = status.transition(next).unwrap();
    }
    assert!(status.is_terminal());

    let late = status.transition(TaskStatus::Failed).unwrap_err();
    assert_eq!(late.code, ErrorCode::TaskInvalidTransition);
}

/// Filters combine status, type and creation bounds.
#[test]
fn test_filter_combines_criteria() {
    let now = Utc::now();
    let mut old = TaskInfo::new("old", TaskType::Backup, "", 1000, now - Duration::hours(2));
    old.status = TaskStatus::Completed;
    let fresh = TaskInfo::new("fresh", TaskType::Backup, "", 1000, now);
    let command = TaskInfo::new("cmd", TaskType::Command, "", 1000, now);

    let backups = TaskFilter::new().with_type(TaskType::Backup);
    assert!(backups.matches(&old));
    assert!(backups.matches(&fresh));
    assert!(!backups.matches(&command));

    let recent = backups.clone().created_after(now - Duration::minutes(5));
    assert!(!recent.matches(&old));
    assert!(recent.matches(&fresh));

    let done = TaskFilter::new().with_status(TaskStatus::Completed);
    assert!(done.matches(&old));
    assert!(!done.matches(&fresh));

    let before = TaskFilter::new().created_before(now - Duration::hours(1));
    assert!(before.matches(&old));
    assert!(!before.matches(&command));
}

/// Stats count each status once.
#[test]
fn test_stats_tally_statuses() {
    let mut stats = TaskStats::default();
    let statuses =
        [TaskStatus::Pending, TaskStatus::Running, TaskStatus::Timeout, TaskStatus::Running];
    for status in statuses {
        stats.record(status);
    }
    assert_eq!(stats.total, 4);
    assert_eq!(stats.running, 2);
    assert_eq!(stats.timeout, 1);
    assert_eq!(stats.active(), 3);
}
