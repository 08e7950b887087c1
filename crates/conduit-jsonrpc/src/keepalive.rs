//! Cooperative ping scheduling.
//!
//! There is no timer thread: the host calls [`KeepAliveSession::tick`] from
//! its own loop, at least as often as the resolution it wants.

use chrono::{DateTime, Utc};
use conduit_types::Clock;
use conduit_types::clock::to_delta;
use std::sync::Arc;
use std::time::Duration;

/// Decides when the next keep-alive ping is due.
pub struct KeepAliveSession {
    clock: Arc<dyn Clock>,
    interval: Duration,
    next_ping_at: Option<DateTime<Utc>>,
}

impl KeepAliveSession {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            next_ping_at: None,
        }
    }

    /// Arm the schedule; the first ping is due one interval from now.
    pub fn start(&mut self) {
        self.next_ping_at = Some(self.clock.now() + to_delta(self.interval));
    }

    pub fn stop(&mut self) {
        self.next_ping_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_ping_at.is_some()
    }

    pub fn next_ping_at(&self) -> Option<DateTime<Utc>> {
        self.next_ping_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `ping` if a ping is due, then rearm. Returns whether it ran.
    pub fn tick(&mut self, ping: impl FnOnce()) -> bool {
        let Some(due) = self.next_ping_at else {
            return false;
        };
        let now = self.clock.now();
        if now < due {
            return false;
        }
        ping();
        self.next_ping_at = Some(now + to_delta(self.interval));
        true
    }
}
