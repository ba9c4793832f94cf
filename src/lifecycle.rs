use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::info;

use crate::errors::Error;

/// One-shot `Unloaded -> Loaded` latch. There is no way back to `Unloaded`.
pub enum LifecycleState<T> {
    Unloaded,
    Loaded(Arc<T>),
}

/// Guards access to state that only exists once initialization has run.
///
/// Readers never take a lock, so the arming closure may query the gate; it
/// observes `Unloaded` until arming returns.
pub struct LifecycleGate<T> {
    armed: OnceLock<Arc<T>>,
    arming: Mutex<()>,
}

impl<T> LifecycleGate<T> {
    pub fn new() -> Self {
        Self {
            armed: OnceLock::new(),
            arming: Mutex::new(()),
        }
    }

    /// Runs `arm` and flips the latch, unless some caller already has.
    ///
    /// Returns `Ok(true)` for the call that performed initialization and
    /// `Ok(false)` for every other call. Concurrent callers wait for the first
    /// to finish; if `arm` fails the gate stays `Unloaded` and the error is returned.
    /// `arm` must not call `initialize` on the same gate.
    pub fn initialize<F>(&self, arm: F) -> Result<bool, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if self.is_ready() {
            return Ok(false);
        }
        let _arming = self.arming.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_ready() {
            return Ok(false);
        }
        let armed = Arc::new(arm()?);
        if self.armed.set(armed).is_err() {
            return Ok(false);
        }
        info!("lifecycle.loaded");
        Ok(true)
    }

    pub fn state(&self) -> LifecycleState<T> {
        match self.armed.get() {
            Some(armed) => LifecycleState::Loaded(Arc::clone(armed)),
            None => LifecycleState::Unloaded,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.armed.get().is_some()
    }

    pub fn require_ready(&self) -> Result<Arc<T>, Error> {
        match self.state() {
            LifecycleState::Loaded(armed) => Ok(armed),
            LifecycleState::Unloaded => Err(Error::NotLoaded),
        }
    }
}

impl<T> Default for LifecycleGate<T> {
    fn default() -> Self {
        Self::new()
    }
}
