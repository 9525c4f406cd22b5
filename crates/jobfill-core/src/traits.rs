use std::future::Future;

use crate::error::AppError;
use crate::job::{AuditRecord, CandidateFilter, CandidateJob, FetchOutcome};

/// One browser-automation session driven against detail pages.
///
/// A session is owned by exactly one worker slot at a time; it is never
/// shared between concurrently executing workers.
pub trait DetailSession: Send + Sync {
    /// Navigate to a job URL and classify what came back. Expected failure
    /// modes (timeout, challenge, crashed window) are outcomes, not errors.
    fn fetch(&self, url: &str) -> impl Future<Output = FetchOutcome> + Send;

    /// Cheap liveness probe. Any transport failure means not alive.
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    /// Tear the session down, releasing the browser process. Best-effort.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Creates [`DetailSession`] instances. The engine calls this once per worker
/// slot up front and again on every restart.
pub trait SessionFactory: Send + Sync + Clone {
    type Session: DetailSession + Send + 'static;

    fn create(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Read/write access to job records in the shared store.
///
/// `update_description` is the conditional-update contract that makes
/// concurrent regional instances safe: it must only write when the stored
/// description is still empty, and report how many rows actually changed.
pub trait JobStore: Send + Sync + Clone {
    fn candidates(
        &self,
        filter: &CandidateFilter,
    ) -> impl Future<Output = Result<Vec<CandidateJob>, AppError>> + Send;

    /// Conditional write: fills description (and suburb, when present) only
    /// if the stored description is still empty/placeholder. Returns the
    /// number of rows changed; zero means another process won the race.
    fn update_description(
        &self,
        job_id: i64,
        description: &str,
        suburb: Option<&str>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Unconditional, idempotent salary upsert by id.
    fn update_salary(
        &self,
        job_id: i64,
        min_salary: i32,
        max_salary: i32,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Unconditional, idempotent tech-stack upsert by id.
    fn update_tech_stack(
        &self,
        job_id: i64,
        stack: &[String],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Jobs with a description but no extracted tech stack yet, for the
    /// post-run enrichment pass. Returns `(id, description)` pairs.
    fn tech_stack_candidates(
        &self,
        limit: Option<i64>,
    ) -> impl Future<Output = Result<Vec<(i64, String)>, AppError>> + Send;

    /// Jobs with a pay-range string but no normalized salary yet. Returns
    /// `(id, pay_range)` pairs.
    fn salary_candidates(
        &self,
        limit: Option<i64>,
    ) -> impl Future<Output = Result<Vec<(i64, String)>, AppError>> + Send;

    /// Batch-set salary to zero for jobs with no pay-range text at all, so
    /// the post pass never re-selects them. Returns rows changed.
    fn zero_empty_pay_ranges(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Converts the description container's HTML into plain text for storage
/// and analysis.
pub trait TextCleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Append-only audit log, one record per successfully updated job.
pub trait AuditLog: Send + Sync + Clone {
    fn record(&self, record: &AuditRecord) -> Result<(), AppError>;
}

/// One raw request to the text-analysis API with a specific key. Status
/// classification (403/429/5xx) is expressed through [`AppError`] variants;
/// the rotation state machine lives above this seam.
pub trait AnalysisTransport: Send + Sync {
    fn send(
        &self,
        api_key: &str,
        prompt: &str,
        text: &str,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// High-level enrichment operations consumed by the enrichment worker and
/// the post-run pass. `&mut` because key-pool state advances per call.
pub trait TextEnricher: Send {
    fn extract_tech_stack(
        &mut self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    fn normalize_salary(
        &mut self,
        pay_range: &str,
    ) -> impl Future<Output = Result<(i32, i32), AppError>> + Send;
}
