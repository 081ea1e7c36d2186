//! Bounded retry with a fixed delay between attempts.
//!
//! One parameterized helper used wherever the monitor needs a retry budget
//! (printer connection today). Sleeping is injected through [`Sleeper`] so the
//! exact attempt and delay sequence is observable in tests.

#![allow(missing_docs)]

use std::time::Duration;

/// A retry budget: `max_attempts` total tries, `delay` between consecutive tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Something that can block the current thread for a duration.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Real wall-clock sleeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps instead of blocking.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    pub sleeps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

/// Sleep `total` in chunks of at most `slice`, checking `stop` before each.
///
/// Returns `false` as soon as `stop` reports true, `true` once the full
/// duration has elapsed without a stop request.
pub fn sleep_sliced<S, C>(sleeper: &mut S, total: Duration, slice: Duration, mut stop: C) -> bool
where
    S: Sleeper + ?Sized,
    C: FnMut() -> bool,
{
    let slice = if slice.is_zero() { total } else { slice };
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop() {
            return false;
        }
        let step = remaining.min(slice);
        sleeper.sleep(step);
        remaining -= step;
    }
    !stop()
}

/// All attempts failed; carries the last error.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Why [`retry_with_delay`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    Exhausted(RetryExhausted<E>),
    /// `cancelled` reported true before the next attempt.
    Cancelled { attempts: u32 },
}

/// Run `op` until it succeeds, the budget is spent, or `cancelled` fires.
///
/// `op` receives the 1-indexed attempt number. `on_failure` is invoked after
/// every failed attempt (before any delay) with the attempt number and error.
/// `cancelled` is checked before every attempt. No delay follows the final
/// attempt.
pub fn retry_with_delay<T, E, S, C, F, G>(
    policy: RetryPolicy,
    sleeper: &mut S,
    mut cancelled: C,
    mut op: F,
    mut on_failure: G,
) -> Result<T, RetryError<E>>
where
    S: Sleeper + ?Sized,
    C: FnMut() -> bool,
    F: FnMut(u32) -> Result<T, E>,
    G: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancelled() {
            return Err(RetryError::Cancelled {
                attempts: attempt - 1,
            });
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => {
                on_failure(attempt, &error);
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted(RetryExhausted {
                        attempts: attempt,
                        last_error: error,
                    }));
                }
                sleeper.sleep(policy.delay);
                attempt += 1;
            }
        }
    }
}
