//! Request pacing and session refresh policy for upstream HTTP clients.
//!
//! The provider tolerates roughly one request every few seconds from a single
//! session, and sessions go stale after a few dozen requests. Both limits are
//! explicit values owned by the client handle.

use std::time::{Duration, Instant};

/// Enforces a fixed gap between the end of one request and the start of the next.
///
/// The gap is measured from [`RequestThrottle::mark_done`], so a slow response
/// does not eat into it.
#[derive(Debug, Clone)]
pub struct RequestThrottle {
    min_interval: Duration,
    last_finished: Option<Instant>,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_finished: None,
        }
    }

    /// Time still to wait before the next request may go out.
    pub fn remaining(&self) -> Duration {
        match self.last_finished {
            None => Duration::ZERO,
            Some(at) => self.min_interval.saturating_sub(at.elapsed()),
        }
    }

    /// Block until the gap since the last finished request has passed.
    pub fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }

    /// Record that a request just finished, successfully or not.
    pub fn mark_done(&mut self) {
        self.last_finished = Some(Instant::now());
    }
}

/// Counts requests on the current session and says when to rebuild it.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    refresh_after: u32,
    used: u32,
    fresh: bool,
}

impl SessionPolicy {
    /// `refresh_after == 0` disables periodic refresh.
    pub fn new(refresh_after: u32) -> Self {
        Self {
            refresh_after,
            used: 0,
            fresh: false,
        }
    }

    /// True before the first request and after every `refresh_after` requests.
    pub fn needs_refresh(&self) -> bool {
        !self.fresh || (self.refresh_after > 0 && self.used >= self.refresh_after)
    }

    pub fn record_use(&mut self) {
        self.used += 1;
    }

    pub fn mark_refreshed(&mut self) {
        self.used = 0;
        self.fresh = true;
    }

    pub fn uses(&self) -> u32 {
        self.used
    }
}
