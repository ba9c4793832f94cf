//! Supervision for refresh cycles that never report back.
//!
//! A refresh trigger that never leads to `refresh_completed` would hold every
//! later request forever. The watchdog polls the dispatcher and fails a cycle
//! that has been open longer than `timeout`, releasing the held requests with
//! `Error::RefreshFailed`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawn a task that force-fails refresh cycles older than `timeout`.
///
/// Checks every `interval`, raised to at least one millisecond. The task holds
/// only a weak reference and exits once the dispatcher is dropped.
pub fn spawn_refresh_watchdog(
    dispatcher: &Arc<Dispatcher>,
    timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    let dispatcher = Arc::downgrade(dispatcher);
    let interval = interval.max(MIN_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !check_once(&dispatcher, timeout) {
                debug!("dispatcher dropped, stopping refresh watchdog");
                return;
            }
        }
    })
}

/// Returns `false` once the dispatcher is gone.
fn check_once(dispatcher: &Weak<Dispatcher>, timeout: Duration) -> bool {
    let Some(dispatcher) = dispatcher.upgrade() else {
        return false;
    };
    // An uninitialized dispatcher has nothing to supervise yet.
    if let Ok(Some(discarded)) = dispatcher.fail_stale_refresh(timeout) {
        warn!(
            timeout_ms = timeout.as_millis() as u64,
            discarded,
            "watchdog.reset"
        );
    }
    true
}
