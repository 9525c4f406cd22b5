use chrono::{DateTime, Utc};

use crate::region::Region;

/// A job posting still missing its full description, as selected from the
/// store. `pay_range` is carried along so the enrichment item can be built
/// without a second read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateJob {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub pay_range: Option<String>,
}

/// Filter applied when selecting candidate jobs.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub region: Option<Region>,
    pub include_inactive: bool,
    pub limit: Option<i64>,
}

/// One unit of fetch work. Queued once per run, never requeued; failures are
/// retried in place within a single worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub job_id: i64,
    pub url: String,
    pub title: String,
}

impl From<&CandidateJob> for FetchTask {
    fn from(job: &CandidateJob) -> Self {
        FetchTask {
            job_id: job.id,
            url: job.url.clone(),
            title: job.title.clone(),
        }
    }
}

/// Result of one fetch attempt against a detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A recognized description container with non-empty content.
    /// `description` is the container's inner HTML; `suburb` is the optional
    /// location label found alongside it.
    Success {
        description: String,
        suburb: Option<String>,
    },
    /// Page rendered but no description container matched.
    NoContent,
    /// An anti-bot challenge page that survived the re-read wait.
    CloudflareBlocked,
    /// The browser session died mid-fetch (window closed, target gone).
    SessionCrashed,
    /// Navigation or rendering exceeded the page-load timeout.
    Timeout,
    /// Anything else.
    OtherError(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }

    /// Short label for log lines and failure accounting.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Success { .. } => "success",
            FetchOutcome::NoContent => "no_content",
            FetchOutcome::CloudflareBlocked => "cloudflare_blocked",
            FetchOutcome::SessionCrashed => "session_crashed",
            FetchOutcome::Timeout => "timeout",
            FetchOutcome::OtherError(_) => "other_error",
        }
    }
}

/// Work item handed to the background enrichment worker after a successful
/// fetch. Dropped (with a warning) if the queue is full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentItem {
    pub job_id: i64,
    pub description: String,
    pub pay_range: Option<String>,
}

/// One row of the append-only audit log, written per successfully updated job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub job_id: i64,
    pub title: String,
    pub url: String,
    pub suburb: Option<String>,
    pub description: String,
    pub scraped_at: DateTime<Utc>,
}
