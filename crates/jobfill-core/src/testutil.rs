//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::job::{AuditRecord, CandidateFilter, CandidateJob, FetchOutcome};
use crate::traits::{
    AnalysisTransport, AuditLog, DetailSession, JobStore, SessionFactory, TextCleaner,
    TextEnricher,
};

// ---------------------------------------------------------------------------
// MockSession / MockSessionFactory
// ---------------------------------------------------------------------------

/// Mock browser session with a scripted queue of fetch outcomes.
///
/// Each `fetch` pops the next scripted outcome; an empty script returns a
/// default success. The `id` distinguishes handles across restarts.
#[derive(Clone)]
pub struct MockSession {
    pub id: usize,
    outcomes: Arc<Mutex<Vec<FetchOutcome>>>,
    alive: Arc<AtomicBool>,
    pub closed: Arc<AtomicBool>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl MockSession {
    pub fn new(id: usize, outcomes: Vec<FetchOutcome>, alive: bool) -> Self {
        Self {
            id,
            outcomes: Arc::new(Mutex::new(outcomes)),
            alive: Arc::new(AtomicBool::new(alive)),
            closed: Arc::new(AtomicBool::new(false)),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn default_success() -> FetchOutcome {
        FetchOutcome::Success {
            description: "<p>role details</p>".to_string(),
            suburb: Some("Perth".to_string()),
        }
    }
}

impl DetailSession for MockSession {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.fetched.lock().unwrap().push(url.to_string());
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Self::default_success()
        } else {
            outcomes.remove(0)
        }
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Mock factory producing [`MockSession`]s with per-session scripts and
/// optional injected creation failures.
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    scripts: Arc<Mutex<VecDeque<Vec<FetchOutcome>>>>,
    liveness: Arc<Mutex<VecDeque<bool>>>,
    create_failures: Arc<Mutex<u32>>,
    sessions: Arc<Mutex<Vec<MockSession>>>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome scripts handed to sessions in creation order. Sessions beyond
    /// the scripted ones default to always-success.
    pub fn with_session_scripts(self, scripts: Vec<Vec<FetchOutcome>>) -> Self {
        *self.scripts.lock().unwrap() = scripts.into();
        self
    }

    /// Initial liveness per created session, in creation order.
    pub fn with_liveness(self, liveness: Vec<bool>) -> Self {
        *self.liveness.lock().unwrap() = liveness.into();
        self
    }

    /// Fail the first `n` create calls.
    pub fn with_create_failures(self, n: u32) -> Self {
        *self.create_failures.lock().unwrap() = n;
        self
    }

    /// Number of sessions successfully created so far.
    pub fn created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Handles created so far, in creation order.
    pub fn sessions(&self) -> Vec<MockSession> {
        self.sessions.lock().unwrap().clone()
    }
}

impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    async fn create(&self) -> Result<MockSession, AppError> {
        {
            let mut failures = self.create_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(AppError::SessionError("injected create failure".into()));
            }
        }
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let alive = self.liveness.lock().unwrap().pop_front().unwrap_or(true);
        let mut sessions = self.sessions.lock().unwrap();
        let session = MockSession::new(sessions.len(), script, alive);
        sessions.push(session.clone());
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// MockJobStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct StoredJob {
    description: Option<String>,
    suburb: Option<String>,
}

/// In-memory store implementing the conditional-update contract: a second
/// description write against the same row changes zero rows.
#[derive(Clone, Default)]
pub struct MockJobStore {
    candidates: Arc<Mutex<Vec<CandidateJob>>>,
    jobs: Arc<Mutex<HashMap<i64, StoredJob>>>,
    tech_candidates: Arc<Mutex<Vec<(i64, String)>>>,
    salary_candidates: Arc<Mutex<Vec<(i64, String)>>>,
    tech_updates: Arc<Mutex<Vec<(i64, Vec<String>)>>>,
    salary_updates: Arc<Mutex<Vec<(i64, i32, i32)>>>,
    update_error: Arc<Mutex<Option<AppError>>>,
}

impl MockJobStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store whose `candidates` call returns the given jobs, each backed by
    /// a row with an empty description.
    pub fn with_candidates(candidates: Vec<CandidateJob>) -> Self {
        let store = Self::default();
        {
            let mut jobs = store.jobs.lock().unwrap();
            for c in &candidates {
                jobs.insert(c.id, StoredJob::default());
            }
        }
        *store.candidates.lock().unwrap() = candidates;
        store
    }

    /// Pre-fill a row's description, as if another regional instance won the
    /// race for it.
    pub fn fill_description(&self, job_id: i64, description: &str) {
        self.jobs
            .lock()
            .unwrap()
            .entry(job_id)
            .or_default()
            .description = Some(description.to_string());
    }

    pub fn with_tech_candidates(self, jobs: Vec<(i64, String)>) -> Self {
        *self.tech_candidates.lock().unwrap() = jobs;
        self
    }

    pub fn with_salary_candidates(self, jobs: Vec<(i64, String)>) -> Self {
        *self.salary_candidates.lock().unwrap() = jobs;
        self
    }

    /// Make the next `update_description` call fail.
    pub fn with_update_error(self, error: AppError) -> Self {
        *self.update_error.lock().unwrap() = Some(error);
        self
    }

    pub fn description_of(&self, job_id: i64) -> Option<String> {
        self.jobs
            .lock()
            .unwrap()
            .get(&job_id)
            .and_then(|j| j.description.clone())
    }

    pub fn tech_stack_updates(&self) -> Vec<(i64, Vec<String>)> {
        self.tech_updates.lock().unwrap().clone()
    }

    pub fn salary_updates(&self) -> Vec<(i64, i32, i32)> {
        self.salary_updates.lock().unwrap().clone()
    }
}

impl JobStore for MockJobStore {
    async fn candidates(&self, filter: &CandidateFilter) -> Result<Vec<CandidateJob>, AppError> {
        let all = self.candidates.lock().unwrap().clone();
        let limited = match filter.limit {
            Some(limit) => all.into_iter().take(limit as usize).collect(),
            None => all,
        };
        Ok(limited)
    }

    async fn update_description(
        &self,
        job_id: i64,
        description: &str,
        suburb: Option<&str>,
    ) -> Result<u64, AppError> {
        if let Some(e) = self.update_error.lock().unwrap().take() {
            return Err(e);
        }
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&job_id) else {
            return Ok(0);
        };
        let still_empty = match job.description.as_deref() {
            None | Some("") | Some("None") => true,
            Some(_) => false,
        };
        if !still_empty {
            return Ok(0);
        }
        job.description = Some(description.to_string());
        if let Some(suburb) = suburb {
            job.suburb = Some(suburb.to_string());
        }
        Ok(1)
    }

    async fn update_salary(
        &self,
        job_id: i64,
        min_salary: i32,
        max_salary: i32,
    ) -> Result<(), AppError> {
        self.salary_updates
            .lock()
            .unwrap()
            .push((job_id, min_salary, max_salary));
        Ok(())
    }

    async fn update_tech_stack(&self, job_id: i64, stack: &[String]) -> Result<(), AppError> {
        self.tech_updates
            .lock()
            .unwrap()
            .push((job_id, stack.to_vec()));
        Ok(())
    }

    async fn tech_stack_candidates(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<(i64, String)>, AppError> {
        let all = self.tech_candidates.lock().unwrap().clone();
        Ok(match limit {
            Some(limit) => all.into_iter().take(limit as usize).collect(),
            None => all,
        })
    }

    async fn salary_candidates(&self, limit: Option<i64>) -> Result<Vec<(i64, String)>, AppError> {
        let all = self.salary_candidates.lock().unwrap().clone();
        Ok(match limit {
            Some(limit) => all.into_iter().take(limit as usize).collect(),
            None => all,
        })
    }

    async fn zero_empty_pay_ranges(&self) -> Result<u64, AppError> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// MockCleaner
// ---------------------------------------------------------------------------

/// Cleaner that returns its input unchanged, or an injected error.
#[derive(Clone, Default)]
pub struct MockCleaner {
    error: Option<String>,
}

impl MockCleaner {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn with_error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
        }
    }
}

impl TextCleaner for MockCleaner {
    fn clean(&self, html: &str) -> Result<String, AppError> {
        match &self.error {
            Some(message) => Err(AppError::CleanerError(message.clone())),
            None => Ok(html.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingAudit
// ---------------------------------------------------------------------------

/// Audit log that records everything in memory.
#[derive(Clone, Default)]
pub struct RecordingAudit {
    pub records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditLog for RecordingAudit {
    fn record(&self, record: &AuditRecord) -> Result<(), AppError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Mock analysis transport with a scripted queue of responses.
#[derive(Clone)]
pub struct MockTransport {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockTransport {
    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Recorded `(api_key, prompt)` pairs, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, prompt, _)| (key.clone(), prompt.clone()))
            .collect()
    }

    /// Recorded request texts, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }
}

impl AnalysisTransport for MockTransport {
    async fn send(&self, api_key: &str, prompt: &str, text: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push((
            api_key.to_string(),
            prompt.to_string(),
            text.to_string(),
        ));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("[]".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockEnricher
// ---------------------------------------------------------------------------

/// Mock enricher with scripted tech-stack and salary results.
#[derive(Clone, Default)]
pub struct MockEnricher {
    tech: Arc<Mutex<Vec<Result<Vec<String>, AppError>>>>,
    salary: Arc<Mutex<Vec<Result<(i32, i32), AppError>>>>,
}

impl MockEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tech_responses(self, responses: Vec<Result<Vec<String>, AppError>>) -> Self {
        *self.tech.lock().unwrap() = responses;
        self
    }

    pub fn with_salary_responses(self, responses: Vec<Result<(i32, i32), AppError>>) -> Self {
        *self.salary.lock().unwrap() = responses;
        self
    }
}

impl TextEnricher for MockEnricher {
    async fn extract_tech_stack(&mut self, _text: &str) -> Result<Vec<String>, AppError> {
        let mut responses = self.tech.lock().unwrap();
        if responses.is_empty() {
            Ok(Vec::new())
        } else {
            responses.remove(0)
        }
    }

    async fn normalize_salary(&mut self, _pay_range: &str) -> Result<(i32, i32), AppError> {
        let mut responses = self.salary.lock().unwrap();
        if responses.is_empty() {
            Ok((0, 0))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create `n` candidate jobs with ids `1..=n`.
pub fn make_candidates(n: i64) -> Vec<CandidateJob> {
    (1..=n)
        .map(|id| CandidateJob {
            id,
            url: format!("https://example.com/job/{id}"),
            title: format!("Job {id}"),
            pay_range: None,
        })
        .collect()
}
