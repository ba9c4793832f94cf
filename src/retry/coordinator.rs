use rand::{SeedableRng, rngs::StdRng};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::errors::Error;

use super::{RetryOutcome, plan::RetryPlan};

/// Runs one transport attempt after another according to a [`RetryPlan`].
///
/// Only transport failures are retried here; admission and refresh decisions
/// happen before a request ever reaches the transport.
pub struct RetryCoordinator {
    plan: RetryPlan,
    rng: Mutex<StdRng>,
}

impl RetryCoordinator {
    pub fn new(plan: RetryPlan) -> Self {
        Self {
            plan,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub async fn execute<F, Fut, T>(
        &self,
        request_id: Uuid,
        mut op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u8) -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, Error>> + Send,
    {
        let mut attempt: u8 = 1;
        let start = Instant::now();
        loop {
            match op(attempt).await {
                Ok(value) => {
                    let outcome = RetryOutcome {
                        request_id,
                        attempts: attempt,
                        success: true,
                        total_delay: start.elapsed(),
                    };
                    outcome.log();
                    return Ok((value, outcome));
                }
                Err(err) => {
                    if attempt >= self.plan.max_attempts || !Self::is_retriable(&err) {
                        RetryOutcome {
                            request_id,
                            attempts: attempt,
                            success: false,
                            total_delay: start.elapsed(),
                        }
                        .log();
                        return Err(err);
                    }
                    let delay = {
                        let mut rng = self.rng.lock().await;
                        self.plan.delay_for_attempt(attempt + 1, &mut *rng)
                    };
                    warn!(
                        request_id = %request_id,
                        attempt,
                        max_attempts = self.plan.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retry.scheduling"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub(crate) fn is_retriable(err: &Error) -> bool {
        match err {
            Error::Http(status, _) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Error::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(RetryPlan::default())
    }
}
