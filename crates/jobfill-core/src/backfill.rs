//! The backfill coordinator: loads candidate jobs, drives browser sessions
//! against them (serially or with a fixed worker pool), persists results
//! through the conditional-update contract, and feeds the enrichment queue.
//!
//! Session lifecycle is self-healing: a slot restarts its session on a failed
//! liveness probe, on a mid-fetch crash, after too many back-to-back failures
//! (serial mode), and proactively every `restart_interval` jobs (serial mode).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::BackfillConfig;
use crate::enrich::EnrichmentSender;
use crate::error::AppError;
use crate::job::{
    AuditRecord, CandidateFilter, CandidateJob, EnrichmentItem, FetchOutcome, FetchTask,
};
use crate::pacing::Pacing;
use crate::stats::{RunStatistics, StatsSnapshot};
use crate::traits::{AuditLog, DetailSession, JobStore, SessionFactory, TextCleaner};

/// One worker's session plus the counters its restart policy runs on.
/// `session` is `None` only while a restart is failing.
struct SessionSlot<SF: SessionFactory> {
    factory: SF,
    session: Option<SF::Session>,
    jobs_since_restart: u32,
    consecutive_failures: u32,
}

impl<SF: SessionFactory> SessionSlot<SF> {
    fn new(factory: SF, session: SF::Session) -> Self {
        Self {
            factory,
            session: Some(session),
            jobs_since_restart: 0,
            consecutive_failures: 0,
        }
    }

    /// Close the old session (best-effort), wait out the backoff, create a
    /// replacement, and reset both counters.
    async fn restart(
        &mut self,
        reason: &str,
        backoff: Duration,
        stats: &RunStatistics,
    ) -> Result<(), AppError> {
        tracing::warn!(reason, "Restarting browser session");
        if let Some(old) = self.session.take() {
            old.close().await;
        }
        tokio::time::sleep(backoff).await;
        self.session = Some(self.factory.create().await?);
        self.jobs_since_restart = 0;
        self.consecutive_failures = 0;
        stats.record_session_restart();
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

/// Everything a worker needs besides its own session slot and task batch.
struct WorkerShared<C, S, A> {
    cleaner: C,
    store: S,
    audit: A,
    enrichment: Option<EnrichmentSender>,
    stats: Arc<RunStatistics>,
    /// Serializes the conditional write path across workers.
    write_lock: Arc<Mutex<()>>,
    pacing: Pacing,
    max_job_retries: u32,
    max_consecutive_failures: u32,
    restart_interval: u32,
    restart_backoff: Duration,
}

impl<C: Clone, S: Clone, A: Clone> Clone for WorkerShared<C, S, A> {
    fn clone(&self) -> Self {
        Self {
            cleaner: self.cleaner.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
            enrichment: self.enrichment.clone(),
            stats: Arc::clone(&self.stats),
            write_lock: Arc::clone(&self.write_lock),
            pacing: self.pacing,
            max_job_retries: self.max_job_retries,
            max_consecutive_failures: self.max_consecutive_failures,
            restart_interval: self.restart_interval,
            restart_backoff: self.restart_backoff,
        }
    }
}

/// The backfill engine. Generic over its seams so tests drive it entirely
/// with mocks; production wires the browser factory, htmd cleaner, Postgres
/// store, and CSV audit log.
pub struct Backfiller<SF, C, S, A> {
    factory: SF,
    cleaner: C,
    store: S,
    audit: A,
    config: BackfillConfig,
    stats: Arc<RunStatistics>,
}

impl<SF, C, S, A> Backfiller<SF, C, S, A>
where
    SF: SessionFactory + 'static,
    C: TextCleaner + 'static,
    S: JobStore + 'static,
    A: AuditLog + 'static,
{
    pub fn new(factory: SF, cleaner: C, store: S, audit: A, config: BackfillConfig) -> Self {
        Self {
            factory,
            cleaner,
            store,
            audit,
            config,
            stats: Arc::new(RunStatistics::new()),
        }
    }

    /// Shared statistics handle, also used by the enrichment worker.
    pub fn stats(&self) -> Arc<RunStatistics> {
        Arc::clone(&self.stats)
    }

    /// Run the full job list to completion. Callers are expected to have
    /// validated the config; only resource-initialization failures (no
    /// session could be created at all) surface as errors.
    pub async fn run(
        &self,
        enrichment: Option<EnrichmentSender>,
    ) -> Result<StatsSnapshot, AppError> {
        let filter = CandidateFilter {
            region: self.config.region_filter,
            include_inactive: self.config.include_inactive,
            limit: self.config.limit,
        };
        let candidates = self.store.candidates(&filter).await?;
        if candidates.is_empty() {
            tracing::info!("No jobs need backfilling");
            return Ok(self.stats.snapshot());
        }

        let workers = self.config.effective_workers();
        tracing::info!(
            count = candidates.len(),
            workers,
            region = self.config.region_filter.map(|r| r.as_str()).unwrap_or("all"),
            "Starting backfill run"
        );

        let shared = WorkerShared {
            cleaner: self.cleaner.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
            enrichment,
            stats: Arc::clone(&self.stats),
            write_lock: Arc::new(Mutex::new(())),
            pacing: Pacing::new(self.config.delay, self.config.jitter),
            max_job_retries: self.config.max_job_retries,
            max_consecutive_failures: self.config.max_consecutive_failures,
            restart_interval: self.config.restart_interval,
            restart_backoff: self.config.restart_backoff,
        };

        if workers <= 1 {
            self.run_serial(shared, candidates).await?;
        } else {
            self.run_concurrent(shared, candidates, workers).await?;
        }
        Ok(self.stats.snapshot())
    }

    async fn run_serial(
        &self,
        shared: WorkerShared<C, S, A>,
        jobs: Vec<CandidateJob>,
    ) -> Result<(), AppError> {
        let session = self.factory.create().await?;
        let slot = SessionSlot::new(self.factory.clone(), session);
        drive_slot(shared, slot, jobs, true, 0).await;
        Ok(())
    }

    async fn run_concurrent(
        &self,
        shared: WorkerShared<C, S, A>,
        jobs: Vec<CandidateJob>,
        workers: usize,
    ) -> Result<(), AppError> {
        let mut slots = Vec::with_capacity(workers);
        for worker in 0..workers {
            match self.factory.create().await {
                Ok(session) => slots.push(SessionSlot::new(self.factory.clone(), session)),
                Err(e) => {
                    tracing::warn!(worker, error = %e, "Failed to create browser session");
                }
            }
        }
        if slots.is_empty() {
            tracing::warn!("No sessions could be created, degrading to serial mode");
            return self.run_serial(shared, jobs).await;
        }
        let n = slots.len();
        if n < workers {
            tracing::warn!(requested = workers, actual = n, "Running with fewer sessions than requested");
        }

        // Static round-robin partition: task[i] goes to slot[i mod n]. Slots
        // are never shared between concurrently executing workers.
        let mut batches: Vec<Vec<CandidateJob>> = (0..n).map(|_| Vec::new()).collect();
        for (i, job) in jobs.into_iter().enumerate() {
            batches[i % n].push(job);
        }

        let mut handles = Vec::with_capacity(n);
        for (worker, (slot, batch)) in slots.into_iter().zip(batches).enumerate() {
            handles.push(tokio::spawn(drive_slot(
                shared.clone(),
                slot,
                batch,
                false,
                worker,
            )));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Fetch worker panicked: {e}");
            }
        }
        Ok(())
    }
}

/// Process one worker's batch on its own session slot, then tear the slot
/// down. Runs as the whole body of a spawned task in concurrent mode.
async fn drive_slot<SF, C, S, A>(
    shared: WorkerShared<C, S, A>,
    mut slot: SessionSlot<SF>,
    jobs: Vec<CandidateJob>,
    serial: bool,
    worker: usize,
) where
    SF: SessionFactory,
    C: TextCleaner,
    S: JobStore,
    A: AuditLog,
{
    let count = jobs.len();
    for (i, job) in jobs.into_iter().enumerate() {
        shared.stats.record_task();

        if serial {
            if slot.consecutive_failures >= shared.max_consecutive_failures {
                if let Err(e) = slot
                    .restart("consecutive failures", shared.restart_backoff, &shared.stats)
                    .await
                {
                    tracing::error!(worker, error = %e, "Session restart failed");
                }
            } else if slot.jobs_since_restart >= shared.restart_interval {
                if let Err(e) = slot
                    .restart("periodic restart", shared.restart_backoff, &shared.stats)
                    .await
                {
                    tracing::error!(worker, error = %e, "Session restart failed");
                }
            }
        }

        let dead = match slot.session.as_ref() {
            Some(session) => !session.is_alive().await,
            None => true,
        };
        if dead
            && let Err(e) = slot
                .restart("liveness probe failed", shared.restart_backoff, &shared.stats)
                .await
        {
            tracing::error!(worker, error = %e, "Session restart failed");
        }

        let task = FetchTask::from(&job);
        let outcome = fetch_with_retry(&mut slot, &task, &shared).await;
        let blocked = matches!(outcome, FetchOutcome::CloudflareBlocked);
        process_outcome(&shared, &mut slot, &job, outcome).await;
        slot.jobs_since_restart += 1;

        if i + 1 < count {
            let delay = if blocked {
                shared.pacing.blocked_delay()
            } else {
                shared.pacing.effective_delay()
            };
            tokio::time::sleep(delay).await;
        }
    }
    slot.close().await;
}

/// Produce exactly one final outcome for a task, retrying transient failures
/// in place. Cloudflare blocks are never retried inline; a crashed session
/// restarts and retries, consuming one attempt.
async fn fetch_with_retry<SF, C, S, A>(
    slot: &mut SessionSlot<SF>,
    task: &FetchTask,
    shared: &WorkerShared<C, S, A>,
) -> FetchOutcome
where
    SF: SessionFactory,
{
    let mut attempts: u32 = 0;
    loop {
        let Some(session) = slot.session.as_ref() else {
            if let Err(e) = slot
                .restart("missing session", shared.restart_backoff, &shared.stats)
                .await
            {
                return FetchOutcome::OtherError(format!("no usable session: {e}"));
            }
            continue;
        };
        let outcome = session.fetch(&task.url).await;
        match outcome {
            FetchOutcome::Success { .. } | FetchOutcome::CloudflareBlocked => return outcome,
            FetchOutcome::SessionCrashed => {
                if attempts >= shared.max_job_retries {
                    return outcome;
                }
                attempts += 1;
                tracing::warn!(
                    job_id = task.job_id,
                    attempt = attempts,
                    "Session crashed mid-fetch, restarting"
                );
                if let Err(e) = slot
                    .restart("session crashed", shared.restart_backoff, &shared.stats)
                    .await
                {
                    return FetchOutcome::OtherError(format!("restart failed: {e}"));
                }
            }
            FetchOutcome::NoContent | FetchOutcome::Timeout | FetchOutcome::OtherError(_) => {
                if attempts >= shared.max_job_retries {
                    return outcome;
                }
                attempts += 1;
                tracing::debug!(
                    job_id = task.job_id,
                    outcome = outcome.label(),
                    attempt = attempts,
                    "Retrying fetch"
                );
            }
        }
    }
}

/// Consume a final outcome: persist, audit, enqueue enrichment, and update
/// counters. A zero-row conditional update means another regional instance
/// already filled this job; that is a benign skip, not a failure.
async fn process_outcome<SF, C, S, A>(
    shared: &WorkerShared<C, S, A>,
    slot: &mut SessionSlot<SF>,
    job: &CandidateJob,
    outcome: FetchOutcome,
) where
    SF: SessionFactory,
    C: TextCleaner,
    S: JobStore,
    A: AuditLog,
{
    match outcome {
        FetchOutcome::Success {
            description,
            suburb,
        } => {
            let text = match shared.cleaner.clean(&description) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(job_id = job.id, error = %e, "Failed to clean description");
                    shared.stats.record_failure();
                    slot.consecutive_failures += 1;
                    return;
                }
            };
            let rows = {
                let _guard = shared.write_lock.lock().await;
                shared
                    .store
                    .update_description(job.id, &text, suburb.as_deref())
                    .await
            };
            match rows {
                Ok(0) => {
                    tracing::debug!(
                        job_id = job.id,
                        "Description already filled elsewhere, skipping"
                    );
                    shared.stats.record_success();
                    slot.consecutive_failures = 0;
                }
                Ok(_) => {
                    tracing::info!(
                        job_id = job.id,
                        title = %job.title,
                        chars = text.len(),
                        "Backfilled description"
                    );
                    let record = AuditRecord {
                        job_id: job.id,
                        title: job.title.clone(),
                        url: job.url.clone(),
                        suburb,
                        description: text.clone(),
                        scraped_at: Utc::now(),
                    };
                    if let Err(e) = shared.audit.record(&record) {
                        tracing::error!(job_id = job.id, error = %e, "Failed to write audit record");
                    }
                    if let Some(sender) = &shared.enrichment {
                        sender.enqueue(EnrichmentItem {
                            job_id: job.id,
                            description: text,
                            pay_range: job.pay_range.clone(),
                        });
                    }
                    shared.stats.record_success();
                    slot.consecutive_failures = 0;
                }
                Err(e) => {
                    tracing::error!(job_id = job.id, error = %e, "Failed to store description");
                    shared.stats.record_failure();
                    slot.consecutive_failures += 1;
                }
            }
        }
        FetchOutcome::CloudflareBlocked => {
            tracing::warn!(job_id = job.id, "Blocked by anti-bot challenge");
            shared.stats.record_cloudflare_block();
            shared.stats.record_failure();
            slot.consecutive_failures += 1;
        }
        other => {
            tracing::warn!(job_id = job.id, outcome = other.label(), "Fetch failed");
            shared.stats.record_failure();
            slot.consecutive_failures += 1;
        }
    }
}
