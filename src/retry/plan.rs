use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::errors::Error;

/// Random scaling applied to each retry delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Scale the backoff by a factor in `[0, 1)`.
    Full,
    /// Scale the backoff by a factor in `[0.5, 1.5)`.
    Decorrelated,
}

/// Backoff schedule the transport applies to a single request.
#[derive(Clone, Debug)]
pub struct RetryPlan {
    pub max_attempts: u8,
    pub initial_delay: Duration,
    pub multiplier: f32,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
}

impl RetryPlan {
    pub fn new(
        max_attempts: u8,
        initial_delay: Duration,
        multiplier: f32,
        max_delay: Duration,
        jitter: JitterStrategy,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
            jitter,
        }
    }

    /// A plan that sends once and never retries.
    pub fn single_attempt() -> Self {
        Self::new(
            1,
            Duration::ZERO,
            1.0,
            Duration::ZERO,
            JitterStrategy::Full,
        )
    }

    /// Delay to wait before `attempt` (1-based). Attempt 1 waits exactly
    /// `initial_delay`; later attempts get jitter over the capped backoff.
    pub fn delay_for_attempt(&self, attempt: u8, rng: &mut impl Rng) -> Duration {
        match attempt {
            0 | 1 => self.initial_delay,
            n => self.jitter.apply(self.backoff(n), rng),
        }
    }

    /// `initial_delay * multiplier^(attempt - 1)`, never above `max_delay`.
    fn backoff(&self, attempt: u8) -> Duration {
        let growth = f64::from(self.multiplier).powi(i32::from(attempt) - 1);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * growth)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl JitterStrategy {
    fn apply(self, delay: Duration, rng: &mut impl Rng) -> Duration {
        let range = match self {
            JitterStrategy::Full => 0.0..1.0,
            JitterStrategy::Decorrelated => 0.5..1.5,
        };
        delay.mul_f64(rng.gen_range(range))
    }
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_millis(200),
            1.8,
            Duration::from_secs(5),
            JitterStrategy::Full,
        )
    }
}

impl FromStr for JitterStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [JitterStrategy::Full, JitterStrategy::Decorrelated]
            .into_iter()
            .find(|strategy| s.trim().eq_ignore_ascii_case(strategy.name()))
            .ok_or_else(|| {
                Error::Config(format!(
                    "retry.jitter must be 'full' or 'decorrelated', got '{s}'"
                ))
            })
    }
}

impl JitterStrategy {
    pub fn name(self) -> &'static str {
        match self {
            JitterStrategy::Full => "full",
            JitterStrategy::Decorrelated => "decorrelated",
        }
    }
}
