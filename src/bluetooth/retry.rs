//! Bounded whole-session retries
//!
//! A failed attempt is never resumed: the next attempt starts again from
//! "not connected".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, warn};
use tokio::time::sleep;

use crate::bluetooth::session::{SessionOutcome, SessionSequencer};
use crate::bluetooth::transport::Transport;
use crate::bluetooth::PeripheralIdentity;
use crate::error::SessionFailure;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Hook invoked before each retry with the failed attempt number and reason
pub type RetryHook = Arc<dyn Fn(u32, &SessionFailure) + Send + Sync>;

/// Something that can be attempted as a whole
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Attempt: Send + Sync {
    /// Run one attempt
    async fn attempt(&self) -> Result<(), SessionFailure>;
}

/// Retry configuration
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause between attempts
    pub delay: Duration,
    /// Observer called before each retry
    pub on_retry: Option<RetryHook>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::ZERO,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Set the retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the pause between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the retry observer
    pub fn with_on_retry(mut self, hook: impl Fn(u32, &SessionFailure) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Runs attempts until one succeeds or the policy is exhausted
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    /// Create a controller with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Get the policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds or all attempts fail
    pub async fn run<A: Attempt + ?Sized>(&self, attempt: &A) -> SessionOutcome {
        let max_attempts = self.policy.max_attempts();
        let mut number = 1;
        loop {
            let failure = match attempt.attempt().await {
                Ok(()) => return SessionOutcome::Completed,
                Err(failure) => failure,
            };

            if number >= max_attempts {
                error!("Giving up after {} attempts: {}", number, failure);
                return SessionOutcome::Failed(failure);
            }

            warn!("Try resulted in {}. Retrying...", failure);
            if let Some(hook) = &self.policy.on_retry {
                hook(number, &failure);
            }
            if !self.policy.delay.is_zero() {
                sleep(self.policy.delay).await;
            }
            number += 1;
        }
    }

    /// Run a session against `device` with retries
    pub async fn run_session<T: Transport>(
        &self,
        sequencer: &SessionSequencer<T>,
        device: &PeripheralIdentity,
    ) -> SessionOutcome {
        self.run(&SessionAttempt { sequencer, device }).await
    }
}

/// A sequencer bound to one device
pub struct SessionAttempt<'a, T: Transport> {
    sequencer: &'a SessionSequencer<T>,
    device: &'a PeripheralIdentity,
}

impl<'a, T: Transport> SessionAttempt<'a, T> {
    /// Bind a sequencer to a device
    pub fn new(sequencer: &'a SessionSequencer<T>, device: &'a PeripheralIdentity) -> Self {
        Self { sequencer, device }
    }
}

#[async_trait]
impl<'a, T: Transport> Attempt for SessionAttempt<'a, T> {
    async fn attempt(&self) -> Result<(), SessionFailure> {
        self.sequencer.try_run(self.device).await
    }
}
