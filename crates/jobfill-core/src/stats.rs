use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically-incrementing counters for one run. Process-local, shared by
/// fetch workers and the enrichment worker, reported once at shutdown.
///
/// Counters only accumulate, so relaxed ordering is enough.
#[derive(Debug, Default)]
pub struct RunStatistics {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    cloudflare_blocked: AtomicU64,
    session_restarts: AtomicU64,
    enrichment_succeeded: AtomicU64,
    enrichment_failed: AtomicU64,
    salary_normalized: AtomicU64,
    salary_skipped: AtomicU64,
    salary_failed: AtomicU64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_task(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cloudflare_block(&self) {
        self.cloudflare_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_restart(&self) {
        self.session_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrichment_success(&self) {
        self.enrichment_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrichment_failure(&self) {
        self.enrichment_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_salary_normalized(&self) {
        self.salary_normalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_salary_skipped(&self) {
        self.salary_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_salary_failure(&self) {
        self.salary_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cloudflare_blocked: self.cloudflare_blocked.load(Ordering::Relaxed),
            session_restarts: self.session_restarts.load(Ordering::Relaxed),
            enrichment_succeeded: self.enrichment_succeeded.load(Ordering::Relaxed),
            enrichment_failed: self.enrichment_failed.load(Ordering::Relaxed),
            salary_normalized: self.salary_normalized.load(Ordering::Relaxed),
            salary_skipped: self.salary_skipped.load(Ordering::Relaxed),
            salary_failed: self.salary_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters, plus the derived success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub cloudflare_blocked: u64,
    pub session_restarts: u64,
    pub enrichment_succeeded: u64,
    pub enrichment_failed: u64,
    pub salary_normalized: u64,
    pub salary_skipped: u64,
    pub salary_failed: u64,
}

impl StatsSnapshot {
    /// Fetch success rate as a percentage of processed tasks.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 * 100.0 / self.total as f64
    }
}
