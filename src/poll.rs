// src/poll.rs
use std::time::Duration;

/// Time source for every wait in the capture engine.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;
    async fn sleep(&self, d: Duration);
}

/// Wall clock backed by tokio's timer.
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { start: tokio::time::Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// A point in clock time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Duration,
}

impl Deadline {
    pub fn after<C: Clock>(clock: &C, timeout: Duration) -> Self {
        Self { at: clock.now() + timeout }
    }

    pub fn expired<C: Clock>(&self, clock: &C) -> bool {
        clock.now() >= self.at
    }
}

/// Policy for waiting until a count stops changing.
#[derive(Debug, Clone, Copy)]
pub struct StabilityPolicy {
    pub max_wait: Duration,
    pub stable_for: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling after `interval`.
    Pending,
    /// Count was non-zero and unchanged for `stable_for`.
    Stable(usize),
    /// `max_wait` elapsed; carries the last observed count.
    Expired(usize),
}

/// Tracks successive count observations. Zero never counts as stable.
#[derive(Debug)]
pub struct StableCounter {
    policy: StabilityPolicy,
    started: Duration,
    prev: Option<usize>,
    since: Duration,
}

impl StableCounter {
    pub fn new(policy: StabilityPolicy, now: Duration) -> Self {
        Self { policy, started: now, prev: None, since: now }
    }

    pub fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }

    pub fn observe(&mut self, count: usize, now: Duration) -> Verdict {
        if self.prev == Some(count) && count > 0 {
            if now.saturating_sub(self.since) >= self.policy.stable_for {
                return Verdict::Stable(count);
            }
        } else {
            self.prev = Some(count);
            self.since = now;
        }
        if now.saturating_sub(self.started) >= self.policy.max_wait {
            return Verdict::Expired(count);
        }
        Verdict::Pending
    }
}
