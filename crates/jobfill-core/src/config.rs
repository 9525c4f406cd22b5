use std::time::Duration;

use crate::error::AppError;
use crate::region::Region;

/// Worker counts above this are clamped; browser sessions are heavy and more
/// than five against one site buys nothing but rate limiting.
pub const MAX_WORKERS: usize = 5;

/// Tuning parameters for one backfill run.
///
/// Callers build this from CLI arguments and are expected to call
/// [`BackfillConfig::validate`] before handing it to the engine.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Base inter-task pacing delay, per worker.
    pub delay: Duration,
    /// Maximum random jitter added on top of `delay` (uniform [0, jitter)).
    pub jitter: Duration,
    /// Requested worker count; clamped to `[1, MAX_WORKERS]` at run time.
    pub workers: usize,
    /// Optional hard cap on jobs processed this run.
    pub limit: Option<i64>,
    pub headless: bool,
    pub use_virtual_display: bool,
    pub region_filter: Option<Region>,
    pub include_inactive: bool,
    /// Serial mode only: proactively restart the session after this many jobs.
    pub restart_interval: u32,
    /// Serial mode only: restart the session after this many back-to-back
    /// non-success outcomes.
    pub max_consecutive_failures: u32,
    /// Additional in-place attempts per task after the first.
    pub max_job_retries: u32,
    /// Fixed wait between closing a dead session and creating its replacement.
    pub restart_backoff: Duration,
    /// Capacity of the bounded enrichment queue; overflow is dropped.
    pub enrichment_queue_capacity: usize,
    pub enable_async_enrichment: bool,
    pub skip_enrichment_post_pass: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            jitter: Duration::from_secs(2),
            workers: 3,
            limit: None,
            headless: true,
            use_virtual_display: false,
            region_filter: None,
            include_inactive: false,
            restart_interval: 30,
            max_consecutive_failures: 3,
            max_job_retries: 2,
            restart_backoff: Duration::from_secs(2),
            enrichment_queue_capacity: 100,
            enable_async_enrichment: true,
            skip_enrichment_post_pass: false,
        }
    }
}

impl BackfillConfig {
    /// Worker count actually used, clamped to `[1, MAX_WORKERS]`.
    pub fn effective_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }

    /// Reject parameter values outside their operational ranges.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.delay < Duration::from_millis(500) || self.delay > Duration::from_secs(30) {
            return Err(AppError::ConfigError(format!(
                "delay must be between 0.5 and 30 seconds, got {:.1}s",
                self.delay.as_secs_f64()
            )));
        }
        if self.workers < 1 {
            return Err(AppError::ConfigError(
                "workers must be at least 1".into(),
            ));
        }
        if !(5..=100).contains(&self.restart_interval) {
            return Err(AppError::ConfigError(format!(
                "restart_interval must be between 5 and 100, got {}",
                self.restart_interval
            )));
        }
        if let Some(limit) = self.limit
            && limit < 1
        {
            return Err(AppError::ConfigError(format!(
                "limit must be at least 1, got {limit}"
            )));
        }
        if self.enrichment_queue_capacity == 0 {
            return Err(AppError::ConfigError(
                "enrichment_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
