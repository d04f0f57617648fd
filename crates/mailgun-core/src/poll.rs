// # Delete Confirmation
//
// Mailgun acknowledges deletes before every replica has caught up; a read
// issued right after a delete can still see the entity. After each delete the
// reconcilers poll an existence check until the entity is gone.
//
// ## Timing
//
// Each check owns one interval slot. A check whose slot would end past the
// limit is not started, so with a fixed interval `I` and timeout `T` at most
// `max(1, T / I)` checks are made. The limit is the policy timeout, or the
// caller's deadline when that comes first.
//
// ## Errors
//
// Only presence is retried. An error from the check itself is returned as-is
// on the first occurrence. A check still running at the limit is abandoned
// and counts as a timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// How a confirmation poll is paced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay before the second check
    pub interval: Duration,
    /// Upper bound for the delay between checks
    pub max_interval: Duration,
    /// Factor applied to the delay after every check; 1.0 keeps it fixed
    pub backoff_multiplier: f64,
}

impl PollPolicy {
    /// Fixed-interval policy
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            max_interval: interval,
            backoff_multiplier: 1.0,
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        current
            .mul_f64(self.backoff_multiplier)
            .min(self.max_interval.max(self.interval))
    }
}

/// Result of one existence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

impl Presence {
    /// `Present` for `Some`, `Absent` for `None`
    pub fn of<T>(found: &Option<T>) -> Self {
        if found.is_some() {
            Presence::Present
        } else {
            Presence::Absent
        }
    }
}

/// Statistics of a successful confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Number of existence checks made
    pub checks: u32,
    /// Time between the first check and the confirming one
    pub elapsed: Duration,
}

/// Poll `check` until it reports [`Presence::Absent`]
///
/// Fails with [`Error::DeleteTimeout`] naming `key` when the entity is still
/// present at the limit. Dropping the returned future cancels the poll.
pub async fn confirm_absent<F, Fut>(
    key: &str,
    policy: &PollPolicy,
    deadline: Option<Instant>,
    mut check: F,
) -> Result<PollOutcome>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Presence>>,
{
    let start = Instant::now();
    let limit = match deadline {
        Some(deadline) => deadline.min(start + policy.timeout),
        None => start + policy.timeout,
    };

    let mut interval = policy.interval;
    let mut checks: u32 = 0;

    let timed_out = |checks: u32| {
        let elapsed = start.elapsed();
        tracing::warn!(
            "{} still present after {} check(s) over {:?}",
            key,
            checks,
            elapsed
        );
        Error::DeleteTimeout {
            key: key.to_string(),
            elapsed,
        }
    };

    loop {
        checks += 1;
        let presence = tokio::time::timeout_at(limit, check())
            .await
            .map_err(|_| timed_out(checks))??;
        if presence == Presence::Absent {
            let elapsed = start.elapsed();
            tracing::debug!("{} confirmed absent after {} check(s)", key, checks);
            return Ok(PollOutcome { checks, elapsed });
        }

        let next_start = Instant::now() + interval;
        let next_interval = policy.next_interval(interval);
        if next_start + next_interval > limit {
            return Err(timed_out(checks));
        }

        tracing::trace!("{} still present, checking again in {:?}", key, interval);
        tokio::time::sleep(interval).await;
        interval = next_interval;
    }
}
