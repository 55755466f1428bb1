//! Bounded retry policy for runtime bootstrap
//!
//! Instance creation fails transiently while a headset is being attached or
//! the runtime service is still starting. The application retries through a
//! [`Backoff`], which sleeps for an increasing delay between attempts and
//! gives up for good after [`Backoff::MAX_RETRIES`].

use std::time::Duration;

use crate::error::{XrError, XrResult};

type Sleeper = Box<dyn FnMut(Duration) + Send>;

/// Exponential retry counter with a capped delay
pub struct Backoff {
    message: String,
    retries: u32,
    max_retries: u32,
    sleeper: Sleeper,
}

impl Backoff {
    /// Number of attempts allowed before [`Backoff::attempt`] fails
    pub const MAX_RETRIES: u32 = 5;

    /// Longest delay between two attempts
    pub const MAX_DELAY: Duration = Duration::from_secs(30);

    /// Create a backoff that blocks the calling thread between attempts
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_sleeper(message, std::thread::sleep)
    }

    /// Create a backoff with a custom sleep function
    pub fn with_sleeper(message: impl Into<String>, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        Self {
            message: message.into(),
            retries: 0,
            max_retries: Self::MAX_RETRIES,
            sleeper: Box::new(sleeper),
        }
    }

    /// Delay used before retry number `retry` (1-based)
    pub fn delay_for(retry: u32) -> Duration {
        let secs = (0.68_f32 * retry as f32).exp().round();
        Duration::from_secs_f32(secs.min(Self::MAX_DELAY.as_secs_f32()))
    }

    /// Record a failed attempt and wait before the next one.
    ///
    /// Fails with [`XrError::RetriesExhausted`] once the retry budget is spent.
    pub fn attempt(&mut self) -> XrResult<()> {
        self.retries += 1;
        if self.retries > self.max_retries {
            log::error!("{} after {} retries", self.message, self.max_retries);
            return Err(XrError::RetriesExhausted {
                message: self.message.clone(),
                retries: self.max_retries,
            });
        }

        let delay = Self::delay_for(self.retries);
        log::info!("{}, will try again in {} seconds", self.message, delay.as_secs());
        (self.sleeper)(delay);
        Ok(())
    }

    /// Forget previous failures after a successful attempt
    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Failed attempts since the last reset
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("message", &self.message)
            .field("retries", &self.retries)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
