use jiff::Timestamp;
use tracing::{Level, event};
use uuid::Uuid;

/// How a refresh cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Pending requests were replayed.
    Replayed,
    /// Pending requests were discarded.
    Discarded,
}

/// Structured events for one refresh cycle, from trigger to completion.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    cycle_id: Uuid,
    started_at: Timestamp,
}

impl RefreshTelemetry {
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
        }
    }

    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn emit_start(&self, remaining_secs: i64) {
        event!(
            Level::INFO,
            cycle_id = %self.cycle_id,
            timestamp = %self.started_at,
            remaining_secs,
            "refresh.start"
        );
    }

    pub fn emit_deferred(&self, request_id: Uuid, pending: usize) {
        event!(
            Level::DEBUG,
            cycle_id = %self.cycle_id,
            request_id = %request_id,
            pending,
            "dispatch.deferred"
        );
    }

    pub fn emit_completed(&self, outcome: RefreshOutcome, requests: usize, at: Timestamp) {
        let elapsed_ms = at.duration_since(self.started_at).as_millis() as i64;
        match outcome {
            RefreshOutcome::Replayed => event!(
                Level::INFO,
                cycle_id = %self.cycle_id,
                outcome = ?outcome,
                requests,
                elapsed_ms,
                "refresh.completed"
            ),
            RefreshOutcome::Discarded => event!(
                Level::WARN,
                cycle_id = %self.cycle_id,
                outcome = ?outcome,
                requests,
                elapsed_ms,
                "refresh.discarded"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_keeps_cycle_id_and_start() {
        let started = Timestamp::now();
        let telemetry = RefreshTelemetry::new(started);
        assert_eq!(telemetry.started_at(), started);
        assert_eq!(telemetry.cycle_id(), telemetry.clone().cycle_id());
        assert_ne!(telemetry.cycle_id(), RefreshTelemetry::new(started).cycle_id());
    }
}
