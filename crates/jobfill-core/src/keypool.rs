//! Multi-key credential pool with cooldown tracking.
//!
//! Pure state machine: every operation takes `now` explicitly so the rotation
//! policy can be tested without waiting out real cooldown windows. The pool
//! is owned by a single [`crate::analysis::AnalysisClient`] and needs no
//! internal locking.

use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Exhausted keys become eligible again after this window, independent of
/// any full-pool reset.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Per-key usage counters, kept for the exit summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStats {
    pub requests: u64,
    pub errors: u64,
    pub exhausted_count: u64,
}

/// Point-in-time pool state for logging.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub current: usize,
    pub exhausted: Vec<usize>,
    pub stats: Vec<KeyStats>,
}

#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    current: usize,
    /// Per-key exhaustion mark; `Some(t)` means marked exhausted at `t`.
    exhausted_at: Vec<Option<Instant>>,
    stats: Vec<KeyStats>,
    cooldown: Duration,
    /// When every key first became simultaneously unusable; cleared on any
    /// successful request.
    outage_start: Option<Instant>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let n = keys.len();
        Self {
            keys,
            current: 0,
            exhausted_at: vec![None; n],
            stats: vec![KeyStats::default(); n],
            cooldown: DEFAULT_COOLDOWN,
            outage_start: None,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_key(&self) -> &str {
        &self.keys[self.current]
    }

    pub fn record_request(&mut self) {
        self.stats[self.current].requests += 1;
    }

    pub fn record_error(&mut self) {
        self.stats[self.current].errors += 1;
    }

    fn is_exhausted(&self, index: usize, now: Instant) -> bool {
        match self.exhausted_at[index] {
            Some(t) => now.duration_since(t) < self.cooldown,
            None => false,
        }
    }

    /// Mark the current key exhausted (quota gone) as of `now`.
    pub fn mark_current_exhausted(&mut self, now: Instant) {
        self.exhausted_at[self.current] = Some(now);
        self.stats[self.current].exhausted_count += 1;
    }

    /// Clear the mark on any key whose cooldown has elapsed. Returns how many
    /// keys were released.
    pub fn release_cooled(&mut self, now: Instant) -> usize {
        let mut released = 0;
        for slot in self.exhausted_at.iter_mut() {
            if let Some(t) = *slot
                && now.duration_since(t) >= self.cooldown
            {
                *slot = None;
                released += 1;
            }
        }
        released
    }

    pub fn available(&self, now: Instant) -> usize {
        (0..self.keys.len())
            .filter(|&i| !self.is_exhausted(i, now))
            .count()
    }

    /// Advance to the next key regardless of its state. Returns the new index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.keys.len();
        self.current
    }

    /// Rotate to the next key that is neither exhausted nor in `skip`.
    /// Returns true if such a key was found (the pool now points at it).
    pub fn rotate_available(&mut self, skip: &HashSet<usize>, now: Instant) -> bool {
        let start = self.current;
        for _ in 0..self.keys.len() {
            self.current = (self.current + 1) % self.keys.len();
            if !self.is_exhausted(self.current, now) && !skip.contains(&self.current) {
                return true;
            }
            if self.current == start {
                break;
            }
        }
        false
    }

    /// Full-pool reset after the all-exhausted wait: clear every mark and
    /// resume from key 0.
    pub fn reset_all(&mut self) {
        for slot in self.exhausted_at.iter_mut() {
            *slot = None;
        }
        self.current = 0;
    }

    /// Record that all keys are unusable as of `now` (if not already in an
    /// outage) and return how long the outage has lasted.
    pub fn outage_elapsed(&mut self, now: Instant) -> Duration {
        let start = *self.outage_start.get_or_insert(now);
        now.duration_since(start)
    }

    /// A successful request ends any outage.
    pub fn clear_outage(&mut self) {
        self.outage_start = None;
    }

    pub fn status(&self, now: Instant) -> PoolStatus {
        let exhausted: Vec<usize> = (0..self.keys.len())
            .filter(|&i| self.is_exhausted(i, now))
            .collect();
        PoolStatus {
            total: self.keys.len(),
            available: self.keys.len() - exhausted.len(),
            current: self.current,
            exhausted,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> KeyPool {
        KeyPool::new((0..n).map(|i| format!("key-{i}")).collect())
    }

    #[test]
    fn new_pool_starts_at_key_zero_with_all_available() {
        let p = pool(3);
        let now = Instant::now();
        assert_eq!(p.current_index(), 0);
        assert_eq!(p.current_key(), "key-0");
        assert_eq!(p.available(now), 3);
    }

    #[test]
    fn marking_exhausted_removes_key_from_availability() {
        let mut p = pool(3);
        let now = Instant::now();
        p.mark_current_exhausted(now);
        assert_eq!(p.available(now), 2);
        assert_eq!(p.status(now).exhausted, vec![0]);
    }

    #[test]
    fn cooldown_releases_exhausted_key() {
        let mut p = pool(2).with_cooldown(Duration::from_secs(300));
        let t0 = Instant::now();
        p.mark_current_exhausted(t0);

        // Still inside the window.
        let released = p.release_cooled(t0 + Duration::from_secs(299));
        assert_eq!(released, 0);
        assert_eq!(p.available(t0 + Duration::from_secs(299)), 1);

        // Past the window the key is eligible again without a pool reset.
        let released = p.release_cooled(t0 + Duration::from_secs(301));
        assert_eq!(released, 1);
        assert_eq!(p.available(t0 + Duration::from_secs(301)), 2);
    }

    #[test]
    fn key_is_eligible_at_the_exact_cooldown_instant() {
        let mut p = pool(2).with_cooldown(Duration::from_secs(300));
        let t0 = Instant::now();
        p.mark_current_exhausted(t0);

        let boundary = t0 + Duration::from_secs(300);
        assert_eq!(p.available(boundary), 2);
        assert_eq!(p.release_cooled(boundary), 1);
    }

    #[test]
    fn rotate_available_skips_exhausted_and_tried_keys() {
        let mut p = pool(3);
        let now = Instant::now();
        p.mark_current_exhausted(now); // key 0 gone

        let mut skip = HashSet::new();
        skip.insert(1);
        assert!(p.rotate_available(&skip, now));
        assert_eq!(p.current_index(), 2);
    }

    #[test]
    fn rotate_available_fails_when_nothing_is_usable() {
        let mut p = pool(2);
        let now = Instant::now();
        p.mark_current_exhausted(now);
        p.advance();
        p.mark_current_exhausted(now);
        assert!(!p.rotate_available(&HashSet::new(), now));
    }

    #[test]
    fn reset_all_clears_marks_and_resumes_from_key_zero() {
        let mut p = pool(3);
        let now = Instant::now();
        for _ in 0..3 {
            p.mark_current_exhausted(now);
            p.advance();
        }
        p.advance();
        p.reset_all();
        assert_eq!(p.current_index(), 0);
        assert_eq!(p.available(now), 3);
    }

    #[test]
    fn outage_timer_accumulates_until_cleared() {
        let mut p = pool(1);
        let t0 = Instant::now();
        assert_eq!(p.outage_elapsed(t0), Duration::ZERO);
        assert_eq!(
            p.outage_elapsed(t0 + Duration::from_secs(90)),
            Duration::from_secs(90)
        );
        p.clear_outage();
        assert_eq!(p.outage_elapsed(t0 + Duration::from_secs(120)), Duration::ZERO);
    }

    #[test]
    fn per_key_counters_track_usage() {
        let mut p = pool(2);
        let now = Instant::now();
        p.record_request();
        p.record_error();
        p.mark_current_exhausted(now);
        p.advance();
        p.record_request();

        let status = p.status(now);
        assert_eq!(status.stats[0].requests, 1);
        assert_eq!(status.stats[0].errors, 1);
        assert_eq!(status.stats[0].exhausted_count, 1);
        assert_eq!(status.stats[1].requests, 1);
        assert_eq!(status.stats[1].errors, 0);
    }
}
