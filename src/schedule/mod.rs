use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::app::Result;
use crate::store::Datastore;

/// Decides whether a keyed task should run again and how long to wait.
///
/// A policy is a pure function of the last attempt time and the attempt
/// count; all durable state lives in the [`Datastore`]. Waits may be
/// negative ("should have run already") — callers treat those as zero.
#[derive(Debug, Clone)]
pub enum Policy {
    /// Run forever, once per `interval`, measured from the last attempt.
    Periodic { interval: Duration },
    /// Fibonacci backoff: wait `fib(count) * base` after the last attempt,
    /// giving up once `count` reaches `max_attempts`.
    Fibonacci { base: Duration, max_attempts: u32 },
}

impl Policy {
    pub fn next(
        &self,
        last: Option<DateTime<Utc>>,
        count: u32,
        now: DateTime<Utc>,
    ) -> (bool, Duration) {
        match *self {
            Policy::Periodic { interval } => match last {
                None => (true, Duration::zero()),
                Some(last) => (true, last + interval - now),
            },
            Policy::Fibonacci { base, max_attempts } => {
                if count >= max_attempts {
                    return (false, Duration::zero());
                }

                match last {
                    None => (true, Duration::zero()),
                    Some(last) => (true, base * fib(count) + (last - now)),
                }
            }
        }
    }
}

fn fib(n: u32) -> i32 {
    let (mut a, mut b) = (0i32, 1i32);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}

/// The fetcher-facing view of attempt scheduling: should `key` run again,
/// and when; and record that it ran.
pub trait Attempter: Send + Sync {
    fn next(&self, key: &str) -> Result<(bool, Duration)>;
    fn inc(&self, key: &str) -> Result<()>;
}

/// Ties a [`Policy`] to the datastore's attempt records.
///
/// `next` reads the current record and applies the policy; `inc` bumps the
/// counter. Both operations share the key space with every other scheduler
/// backed by the same store.
pub struct AttemptScheduler {
    store: Arc<dyn Datastore>,
    policy: Policy,
}

impl AttemptScheduler {
    pub fn new(store: Arc<dyn Datastore>, policy: Policy) -> Self {
        Self { store, policy }
    }
}

impl Attempter for AttemptScheduler {
    fn next(&self, key: &str) -> Result<(bool, Duration)> {
        let (last, count) = self.store.last_attempt(key)?;
        Ok(self.policy.next(last, count, Utc::now()))
    }

    fn inc(&self, key: &str) -> Result<()> {
        self.store.inc_attempt(key)
    }
}
