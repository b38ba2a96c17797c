//! Rate-limit registry (`spec.md` §4.1): a process-wide shared store of the
//! earliest future time at which each external API may be retried.
//!
//! Per the design notes, the registry is an injected handle rather than
//! process-global state, and time itself is injected through a [`Clock`] so
//! tests can fake it instead of sleeping in real time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The two external services the pipeline rate-limits against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    PostsApi,
    NlpApi,
}

/// A source of "now", as a Unix epoch second. Abstracted so tests can
/// advance time deterministically instead of sleeping.
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> i64;
}

/// The real wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs() as i64
    }
}

/// A controllable clock for tests.
#[derive(Debug)]
pub struct FakeClock(AtomicI64);

impl FakeClock {
    pub fn new(start_epoch: i64) -> Self {
        Self(AtomicI64::new(start_epoch))
    }

    pub fn set(&self, epoch: i64) {
        self.0.store(epoch, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_epoch(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Two last-writer-wins cells holding the reset epoch for each [`RateLimitKey`].
/// No locking is required: each writer writes a monotone-expected value and
/// reads are advisory (`spec.md` §4.1, §5).
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    posts_api_reset_at: AtomicI64,
    nlp_api_reset_at: AtomicI64,
}

impl RateLimitRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn cell(&self, key: RateLimitKey) -> &AtomicI64 {
        match key {
            RateLimitKey::PostsApi => &self.posts_api_reset_at,
            RateLimitKey::NlpApi => &self.nlp_api_reset_at,
        }
    }

    /// Overwrites the reset time for `key`.
    pub fn set_reset(&self, key: RateLimitKey, reset_at_epoch: i64) {
        self.cell(key).store(reset_at_epoch, Ordering::SeqCst);
    }

    /// Overwrites the reset time for `key` to `now + secs`. Used by the entity/classify
    /// workers, which bump the NLP registry by a conservative fixed backoff
    /// (`spec.md` §4.6) rather than a vendor-supplied reset time.
    pub fn bump(&self, key: RateLimitKey, secs: i64, clock: &dyn Clock) {
        self.set_reset(key, clock.now_epoch() + secs);
    }

    /// `max(0, reset_at - now)`.
    pub fn time_until_reset(&self, key: RateLimitKey, clock: &dyn Clock) -> i64 {
        (self.cell(key).load(Ordering::SeqCst) - clock.now_epoch()).max(0)
    }
}
