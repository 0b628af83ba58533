//! Local request shaping.
//!
//! The limiter remembers when the store last reported an exhausted budget
//! and refuses further requests until the reset instant, so a drained
//! budget costs no extra round trips.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use gkv_store::{RateLimitStatus, RemoteError};
use tracing::warn;

use crate::error::{RepoError, RepoResult};

#[derive(Debug, Default)]
pub struct RateLimiter {
    blocked_until: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fast if the budget is known to be exhausted at `now`.
    pub fn check(&self, now: DateTime<Utc>) -> RepoResult<()> {
        match self.blocked_until() {
            Some(reset_at) if now < reset_at => Err(RepoError::RateLimited { reset_at }),
            _ => Ok(()),
        }
    }

    /// Record the budget reported with a response.
    pub fn observe_status(&self, status: Option<RateLimitStatus>) {
        let Some(status) = status else { return };
        if status.is_exhausted() {
            self.block_until(status.reset_at);
        }
    }

    /// Record a failed request.
    pub fn observe_error(&self, error: &RemoteError) {
        if let RemoteError::RateLimited { reset_at } = error {
            self.block_until(*reset_at);
        }
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.blocked_until.lock().ok().and_then(|guard| *guard)
    }

    fn block_until(&self, reset_at: DateTime<Utc>) {
        if let Ok(mut guard) = self.blocked_until.lock() {
            if guard.map_or(true, |current| current < reset_at) {
                warn!(%reset_at, "request budget exhausted");
                *guard = Some(reset_at);
            }
        }
    }
}
