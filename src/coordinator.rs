//! Single-flight admission gate in front of the transport.
//!
//! Every non-refresh submission is classified in one critical section that
//! covers the refresh state, the credential, the pending queue and the
//! registered trigger:
//!
//! * `Idle`, no trigger or no credential: admit.
//! * `Idle`, more than the lead time left on the token: admit.
//! * `Idle`, inside the lead window: enqueue, enter `RefreshInProgress`, and
//!   fire the trigger once the lock is released.
//! * `RefreshInProgress`: enqueue.
//!
//! Only [`RefreshCoordinator::refresh_completed`] leaves `RefreshInProgress`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::time::Instant;
use tracing::debug;

use crate::credential::Credential;
use crate::queue::PendingQueue;
use crate::request::Request;
use crate::telemetry::refresh::{RefreshOutcome, RefreshTelemetry};

/// Application-supplied action that starts a token refresh. It must eventually
/// lead to exactly one `refresh_completed` call.
pub type RefreshTrigger = Arc<dyn Fn() + Send + Sync>;

/// What the coordinator decided for a submission.
#[derive(Debug)]
pub enum Admission {
    /// Hand the request to the transport now.
    Admit(Request),
    /// The request is held in the pending queue until the refresh cycle resolves.
    Deferred,
}

/// Snapshot of the coordinator for diagnostics and watchdogs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshStatus {
    pub in_progress: bool,
    pub pending: usize,
    /// When the current cycle was triggered.
    pub started_at: Option<Instant>,
}

struct RefreshCycle {
    telemetry: RefreshTelemetry,
    started: Instant,
}

enum RefreshState {
    Idle,
    InProgress(RefreshCycle),
}

struct GateState {
    refresh: RefreshState,
    credential: Option<Credential>,
    trigger: Option<RefreshTrigger>,
    pending: PendingQueue,
}

pub struct RefreshCoordinator {
    lead_time: SignedDuration,
    state: Mutex<GateState>,
}

impl RefreshCoordinator {
    pub fn new(lead_time: Duration) -> Self {
        Self {
            lead_time: SignedDuration::try_from(lead_time).unwrap_or(SignedDuration::MAX),
            state: Mutex::new(GateState {
                refresh: RefreshState::Idle,
                credential: None,
                trigger: None,
                pending: PendingQueue::new(),
            }),
        }
    }

    // No critical section leaves the state half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn submit(&self, request: Request) -> Admission {
        self.submit_at(request, Timestamp::now())
    }

    pub(crate) fn submit_at(&self, request: Request, now: Timestamp) -> Admission {
        if request.is_refresh() {
            return Admission::Admit(request);
        }

        let trigger = {
            let mut guard = self.lock();
            let state = &mut *guard;

            if let RefreshState::InProgress(cycle) = &state.refresh {
                defer(&mut state.pending, request, &cycle.telemetry);
                return Admission::Deferred;
            }

            let (Some(trigger), Some(credential)) = (&state.trigger, &state.credential) else {
                return Admission::Admit(request);
            };
            let remaining = credential.remaining(now);
            if remaining > self.lead_time {
                return Admission::Admit(request);
            }

            let trigger = Arc::clone(trigger);
            let cycle = RefreshCycle {
                telemetry: RefreshTelemetry::new(now),
                started: Instant::now(),
            };
            cycle.telemetry.emit_start(remaining.as_secs());
            defer(&mut state.pending, request, &cycle.telemetry);
            state.refresh = RefreshState::InProgress(cycle);
            trigger
        };

        // Outside the lock: the trigger may call back into the coordinator.
        trigger();
        Admission::Deferred
    }

    /// Ends the current refresh cycle.
    ///
    /// On success the pending backlog is returned in FIFO order for the caller to
    /// hand to the transport without re-running admission. On failure every held
    /// request is resolved with [`Error::RefreshFailed`](crate::Error::RefreshFailed)
    /// and nothing is returned.
    pub fn refresh_completed(&self, success: bool) -> Vec<Request> {
        let mut state = self.lock();
        if let RefreshState::Idle = state.refresh {
            debug!(success, "refresh completion signalled with no active cycle");
        }
        finish_cycle(&mut state, success)
    }

    /// Fails the current cycle if it was triggered at least `timeout` ago.
    /// Returns how many held requests were discarded, or `None` if nothing was stale.
    pub fn fail_stale(&self, timeout: Duration) -> Option<usize> {
        let mut state = self.lock();
        let RefreshState::InProgress(cycle) = &state.refresh else {
            return None;
        };
        if Instant::now().saturating_duration_since(cycle.started) < timeout {
            return None;
        }
        let pending = state.pending.len();
        finish_cycle(&mut state, false);
        Some(pending)
    }

    pub fn status(&self) -> RefreshStatus {
        let state = self.lock();
        let started_at = match &state.refresh {
            RefreshState::InProgress(cycle) => Some(cycle.started),
            RefreshState::Idle => None,
        };
        RefreshStatus {
            in_progress: started_at.is_some(),
            pending: state.pending.len(),
            started_at,
        }
    }

    pub fn refresh_in_progress(&self) -> bool {
        self.status().in_progress
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.lock().credential.clone()
    }

    /// Replaces the credential as one value; `None` clears it.
    pub fn set_credential(&self, credential: Option<Credential>) {
        self.lock().credential = credential;
    }

    /// Registers the refresh trigger, replacing any previous one.
    pub fn register_refresh(&self, trigger: Option<RefreshTrigger>) {
        self.lock().trigger = trigger;
    }

    pub(crate) fn set_credential_and_trigger(
        &self,
        credential: Credential,
        trigger: RefreshTrigger,
    ) {
        let mut state = self.lock();
        state.credential = Some(credential);
        state.trigger = Some(trigger);
    }
}

fn finish_cycle(state: &mut GateState, success: bool) -> Vec<Request> {
    let now = Timestamp::now();
    let cycle = match std::mem::replace(&mut state.refresh, RefreshState::Idle) {
        RefreshState::InProgress(cycle) => Some(cycle),
        RefreshState::Idle => None,
    };

    if success {
        let replay = state.pending.drain_all();
        if let Some(cycle) = &cycle {
            cycle
                .telemetry
                .emit_completed(RefreshOutcome::Replayed, replay.len(), now);
        }
        replay
    } else {
        let discarded = state.pending.clear();
        if let Some(cycle) = &cycle {
            cycle
                .telemetry
                .emit_completed(RefreshOutcome::Discarded, discarded, now);
        }
        Vec::new()
    }
}

fn defer(pending: &mut PendingQueue, request: Request, telemetry: &RefreshTelemetry) {
    let request_id = request.id();
    pending.enqueue(request);
    telemetry.emit_deferred(request_id, pending.len());
}
