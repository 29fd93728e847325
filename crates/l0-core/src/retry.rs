//! Retry loop with composable stop conditions.
//!
//! Providers use this to wait out eventually-consistent remote state, e.g.
//! a security group that is not yet visible right after creation, or one
//! that cannot be deleted until its dependents are gone.

use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("retry timed out after {0:?}")]
    Timeout(Duration),
    #[error("retry gave up after {0} attempts")]
    MaxAttempts(usize),
    #[error("{0}")]
    Operation(E),
}

/// Why a stop condition vetoed another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Timeout(Duration),
    MaxAttempts(usize),
}

/// Evaluated before every attempt. Returning `Some` ends the loop.
pub trait StopCondition: Send {
    /// `attempt` is 1-based.
    fn before_attempt(&mut self, attempt: usize) -> Option<Stop>;
}

/// Sleeps before every attempt after the first; never vetoes.
#[derive(Debug, Clone)]
pub struct WithDelay {
    delay: Duration,
}

impl StopCondition for WithDelay {
    fn before_attempt(&mut self, attempt: usize) -> Option<Stop> {
        if attempt > 1 {
            std::thread::sleep(self.delay);
        }
        None
    }
}

/// Vetoes once wall time since the first attempt exceeds the limit.
#[derive(Debug, Clone)]
pub struct WithTimeout {
    limit: Duration,
    started: Option<Instant>,
}

impl StopCondition for WithTimeout {
    fn before_attempt(&mut self, _attempt: usize) -> Option<Stop> {
        let started = *self.started.get_or_insert_with(Instant::now);
        if started.elapsed() > self.limit {
            return Some(Stop::Timeout(self.limit));
        }
        None
    }
}

/// Vetoes once the attempt count would exceed `max`.
#[derive(Debug, Clone)]
pub struct WithMaxAttempts {
    max: usize,
}

impl StopCondition for WithMaxAttempts {
    fn before_attempt(&mut self, attempt: usize) -> Option<Stop> {
        (attempt > self.max).then_some(Stop::MaxAttempts(self.max))
    }
}

pub fn with_delay(delay: Duration) -> Box<dyn StopCondition> {
    Box::new(WithDelay { delay })
}

pub fn with_timeout(limit: Duration) -> Box<dyn StopCondition> {
    Box::new(WithTimeout {
        limit,
        started: None,
    })
}

pub fn with_max_attempts(max: usize) -> Box<dyn StopCondition> {
    Box::new(WithMaxAttempts { max })
}

/// Runs `operation` until it reports `Ok(false)` (done), returns `Err`, or a
/// stop condition vetoes the next attempt.
///
/// The operation returns `Ok(true)` to ask for another attempt.
///
/// # Errors
/// - [`RetryError::Operation`] with the operation's own error, unretried.
/// - [`RetryError::Timeout`] / [`RetryError::MaxAttempts`] from the first
///   stop condition that vetoes.
pub fn retry<E, F>(
    mut operation: F,
    mut conditions: Vec<Box<dyn StopCondition>>,
) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        for condition in conditions.iter_mut() {
            match condition.before_attempt(attempt) {
                Some(Stop::Timeout(limit)) => return Err(RetryError::Timeout(limit)),
                Some(Stop::MaxAttempts(max)) => return Err(RetryError::MaxAttempts(max)),
                None => {}
            }
        }

        match operation() {
            Ok(true) => {
                tracing::trace!(attempt, "Retrying operation");
                continue;
            }
            Ok(false) => return Ok(()),
            Err(err) => return Err(RetryError::Operation(err)),
        }
    }
}
