//! Token bucket primitive.
//!
//! One bucket per client key. Tokens accrue continuously at `refill_per_sec`
//! up to `capacity`; a request costs one whole token. Refill is computed
//! lazily from elapsed time at the moment of each call, so there are no
//! background timers and an idle bucket costs nothing.

use std::time::{Duration, Instant};

/// Outcome of consulting a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Tokens left after this call (fractional).
    pub remaining: f64,
    /// Exact wait until one token accrues. Only set when denied.
    pub retry_after: Option<Duration>,
    /// Time until the bucket is back at full capacity.
    pub reset_after: Duration,
}

impl Decision {
    /// Decision for a key with no bucket yet: full capacity, nothing to wait for.
    pub fn full(capacity: f64) -> Self {
        Self {
            allowed: capacity >= 1.0,
            remaining: capacity,
            retry_after: None,
            reset_after: Duration::ZERO,
        }
    }
}

/// Per-client token bucket state.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// New bucket, created full so a client's first burst passes.
    pub fn new(capacity: f64, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: now,
        }
    }

    /// Accrue tokens for the time elapsed since the last touch.
    ///
    /// A non-monotonic `now` (before `last_refill`) accrues nothing and
    /// leaves `last_refill` alone, so a later legitimate call does not
    /// over-refill from the stale timestamp.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to take one token. On failure the balance is left untouched.
    pub fn consume(&mut self, now: Instant) -> Decision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.decision(true)
        } else {
            self.decision(false)
        }
    }

    /// Report state without consuming. Repeated calls at the same instant
    /// return the same answer.
    pub fn status(&mut self, now: Instant) -> Decision {
        self.refill(now);
        self.decision(self.tokens >= 1.0)
    }

    /// Return to full capacity.
    pub fn reset(&mut self, now: Instant) {
        self.tokens = self.capacity;
        self.last_refill = now;
    }

    /// Last instant this bucket was refilled, i.e. last touched.
    pub fn last_touch(&self) -> Instant {
        self.last_refill
    }

    fn decision(&self, allowed: bool) -> Decision {
        let retry_after = if allowed {
            None
        } else {
            let deficit = (1.0 - self.tokens).max(0.0);
            Some(Self::interval(deficit / self.refill_per_sec))
        };
        let reset_after =
            Self::interval((self.capacity - self.tokens).max(0.0) / self.refill_per_sec);
        Decision {
            allowed,
            remaining: self.tokens,
            retry_after,
            reset_after,
        }
    }

    /// A near-zero refill rate pushes these quotients past what `Duration`
    /// can hold; saturate rather than panic.
    fn interval(secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
