//! Integration tests for token and task lifecycles
//!
//! Drives `TokenManager` and `TaskManager` through realistic sequences using
//! Tokio paused time for timers and `MockClock` for "now".

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devicegate_common::time::MockClock;
use devicegate_core::{
    TaskManager, TaskManagerConfig, TaskOptions, TokenManager, TokenManagerConfig, TokenRefresher,
};
use devicegate_domain::{
    ErrorCode, GatewayError, GatewayResult, RefreshedToken, TaskFilter, TaskStatus, TaskType,
    TokenEvent, TokenState,
};

/// Refresher that hands out sequential tokens and can be told to fail
#[derive(Default)]
struct SequenceRefresher {
    calls: AtomicU32,
    failures_remaining: AtomicU32,
}

#[async_trait]
impl TokenRefresher for SequenceRefresher {
    async fn refresh(&self, _refresh_token: &str) -> GatewayResult<RefreshedToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(GatewayError::unavailable("auth service down"));
        }
        Ok(RefreshedToken {
            token: format!("token-{n}"),
            expires_in: Some(600),
            refresh_token: Some(format!("refresh-{n}")),
            scopes: None,
        })
    }
}

/// A token with a 10 minute lifetime is refreshed 5 minutes in, and the new
/// token is refreshed again 5 minutes after that.
///
/// # Test Steps
/// 1. Set a 600s token with a refresh token
/// 2. Let paused time run past two refresh points
/// 3. Assert two refreshes and the rotating refresh token was used
#[tokio::test(start_paused = true)]
async fn test_token_refresh_chain() {
    let refresher = Arc::new(SequenceRefresher::default());
    let clock = MockClock::new();
    let manager = TokenManager::with_clock(
        Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
        TokenManagerConfig::default(),
        Arc::new(clock.clone()),
    );
    let mut events = manager.subscribe();

    manager.set_token("initial", Some(600), Some("refresh-0".into()), None);

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(manager.get_token().as_deref(), Some("token-1"));

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(manager.get_token().as_deref(), Some("token-2"));
    assert_eq!(
        manager.get_full_token().and_then(|t| t.refresh_token).as_deref(),
        Some("refresh-2")
    );

    assert_eq!(events.recv().await.unwrap(), TokenEvent::Refreshed);
    assert_eq!(events.recv().await.unwrap(), TokenEvent::Refreshed);
    assert_eq!(manager.state(), TokenState::Valid);
}

/// A failed background refresh is reported as an event while the current
/// token stays usable until it actually expires.
#[tokio::test(start_paused = true)]
async fn test_failed_background_refresh_keeps_token_until_expiry() {
    let refresher = Arc::new(SequenceRefresher::default());
    refresher.failures_remaining.store(1, Ordering::SeqCst);
    let clock = MockClock::new();
    let manager = TokenManager::with_clock(
        Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
        TokenManagerConfig::default(),
        Arc::new(clock.clone()),
    );
    let mut events = manager.subscribe();

    manager.set_token("initial", Some(60), Some("refresh-0".into()), None);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(matches!(events.recv().await.unwrap(), TokenEvent::RefreshFailed { .. }));
    assert_eq!(manager.get_token().as_deref(), Some("initial"));

    clock.advance_secs(61);
    let err = manager.ensure_valid_token().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthTokenExpired);
    assert_eq!(manager.state(), TokenState::Expired);
}

/// A backup task reports progress, completes, and is swept once the
/// retention window has passed; a forgotten command task times out.
#[tokio::test(start_paused = true)]
async fn test_task_progress_timeout_and_sweep() {
    let clock = MockClock::new();
    let config = TaskManagerConfig {
        retention: Duration::from_secs(60),
        cleanup_interval: Duration::from_secs(30),
        ..TaskManagerConfig::default()
    };
    let manager = TaskManager::with_clock(config, Arc::new(clock.clone()));
    manager.start_cleanup();

    let timeouts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&timeouts);
    manager
        .create_task("backup-1", TaskType::Backup, "Starting backup", TaskOptions::new())
        .unwrap();
    manager
        .create_task(
            "cmd-1",
            TaskType::Command,
            "Running command",
            TaskOptions::new().with_timeout(Duration::from_millis(100)).on_timeout(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    for progress in [25, 50, 75] {
        manager
            .update_task_status("backup-1", TaskStatus::Running, None, Some(progress), None)
            .unwrap();
    }
    manager
        .update_task_status(
            "backup-1",
            TaskStatus::Completed,
            Some("Backup done".into()),
            Some(100),
            None,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(manager.get_task("cmd-1").unwrap().status, TaskStatus::Timeout);
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);

    let terminal = manager.get_tasks(&TaskFilter::new().with_status(TaskStatus::Completed));
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].progress, 100);

    // Past retention; the next sweep tick removes both terminal tasks
    clock.advance_secs(120);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(manager.get_tasks(&TaskFilter::new()).is_empty());

    assert_eq!(manager.shutdown(), 0);
}
