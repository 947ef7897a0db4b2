//! One-shot and recurring timers
//!
//! Timers are spawned Tokio tasks. The returned [`TimerHandle`] cancels the
//! timer when asked to or when dropped: the flag is checked after every sleep
//! and the task is aborted, so a cancelled timer never runs its callback and
//! never keeps the runtime busy. Use [`TimerHandle::detach`] to let a timer
//! outlive its handle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};

/// A handle that can be used to cancel a timer
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    // None once detached
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Cancel the timer
    ///
    /// Cancelling from inside the timer's own callback is allowed; the
    /// callback is aborted at its next suspension point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Release the handle without cancelling the timer
    ///
    /// A timer callback that drops its own handle detaches it first so the
    /// rest of the callback still runs.
    pub fn detach(mut self) {
        self.task.take();
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the underlying task has run to completion (or was aborted)
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel();
        }
    }
}

/// Run `callback` once after `delay`
///
/// Must be called from within a Tokio runtime.
///
/// ```no_run
/// use std::time::Duration;
///
/// use devicegate_common::time::schedule_once;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = schedule_once(Duration::from_secs(5), async {
///         tracing::info!("fired");
///     });
///     handle.cancel();
/// }
/// ```
pub fn schedule_once<Fut>(delay: Duration, callback: Fut) -> TimerHandle
where
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = tokio::spawn(async move {
        if !delay.is_zero() {
            sleep(delay).await;
        }
        if !flag.load(Ordering::SeqCst) {
            callback.await;
        }
    });

    TimerHandle { cancelled, task: Some(task) }
}

/// Run `callback` every `period`, starting one period from now
///
/// Missed ticks are delayed rather than bursted.
pub fn recurring<F, Fut>(period: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip first immediate tick

        loop {
            interval.tick().await;
            if flag.load(Ordering::SeqCst) {
                break;
            }
            callback().await;
        }
    });

    TimerHandle { cancelled, task: Some(task) }
}
