use std::time::Duration;

use tracing::Level;
use tracing::event;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub request_id: Uuid,
    pub attempts: u8,
    pub success: bool,
    pub total_delay: Duration,
}

impl RetryOutcome {
    pub fn log(&self) {
        event!(
            Level::DEBUG,
            request_id = %self.request_id,
            attempts = self.attempts,
            success = self.success,
            total_delay_ms = self.total_delay.as_millis() as u64,
            "retry.outcome"
        );
    }
}
