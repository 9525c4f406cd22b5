//! Inter-task pacing with random jitter.
//!
//! Each worker sleeps between tasks to reduce request burstiness against the
//! target site. The base delay is doubled after a Cloudflare block, since a
//! challenge means the current cadence is already too hot.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Base delay between consecutive tasks on one worker.
    pub delay: Duration,
    /// Maximum random jitter added on top (uniform [0, jitter)).
    pub jitter: Duration,
}

impl Pacing {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        Self { delay, jitter }
    }

    /// Delay for a normal gap: base + random jitter.
    pub fn effective_delay(&self) -> Duration {
        self.delay + self.jitter_part()
    }

    /// Delay after an anti-bot block: doubled base + random jitter.
    pub fn blocked_delay(&self) -> Duration {
        self.delay * 2 + self.jitter_part()
    }

    fn jitter_part(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        Duration::from_millis(rand_jitter_ms(self.jitter.as_millis() as u64))
    }
}

// Deterministic jitter based on std — avoids pulling in the `rand` crate.
// Uses a simple xorshift seeded from the current time.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    // Seed from high-resolution clock — good enough for jitter, not crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}
