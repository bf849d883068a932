use std::time::Duration;

use rand::Rng;

use crate::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Bounded exponential backoff for calls to flaky external sources.
pub struct RetryPolicy
{
    /// The total number of attempts, including the first.
    pub attempts:         u32,
    /// The delay before the first retry, doubled on every further retry.
    pub base_delay:       Duration,
    pub max_delay:        Duration,
    /// The minimum pause after the source told us to slow down.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy
{
    fn default() -> Self
    {
        RetryPolicy {
            attempts:         5,
            base_delay:       Duration::from_secs(1),
            max_delay:        Duration::from_secs(30),
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy
{
    /// Retries immediately, which is only sensible against in-process sources.
    pub fn immediate(attempts: u32) -> Self
    {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_delay: Duration::ZERO,
        }
    }

    /// How long to wait before the given retry (1-indexed), with up to a quarter of jitter on top.
    pub fn delay(&self, retry: u32, err: &Error) -> Duration
    {
        let exponent = retry.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent).min(self.max_delay);

        let base = match err.kind
        {
            | Kind::RateLimited => backoff.max(self.rate_limit_delay),
            | _ => backoff,
        };

        let spread = base.as_millis() as u64 / 4;
        if spread == 0
        {
            base
        }
        else
        {
            base + Duration::from_millis(rand::thread_rng().gen_range(0 ..= spread))
        }
    }

    /// Runs the operation until it succeeds, fails with a non-retryable error, or runs out of attempts.
    pub fn run<T>(&self, label: &str, mut op: impl FnMut() -> Result<T>) -> Result<T>
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop
        {
            match op()
            {
                | Ok(value) => return Ok(value),
                | Err(err) if err.retryable() && attempt < attempts =>
                {
                    let pause = self.delay(attempt, &err);
                    log::warn!("{label}: attempt {attempt}/{attempts} failed, retrying in {pause:?}\n{err}");
                    std::thread::sleep(pause);
                    attempt += 1;
                }
                | Err(err) => return Err(err),
            }
        }
    }
}
