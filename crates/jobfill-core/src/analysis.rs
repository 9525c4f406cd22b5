//! Rate-limited analysis client with automatic key rotation.
//!
//! Wraps a [`KeyPool`] and an [`AnalysisTransport`] and implements the
//! rotation state machine: 403 marks a key exhausted and moves on without
//! consuming retry budget; 429 rotates among keys not yet rate-limited for
//! the current call; a full rotation of exhausted keys triggers a bounded
//! wait-and-reset; an outage longer than the failure ceiling is terminal.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::keypool::{DEFAULT_COOLDOWN, KeyPool, PoolStatus};
use crate::traits::{AnalysisTransport, TextEnricher};

/// System prompt for technology extraction.
pub const TECH_STACK_PROMPT: &str = "You extract technology names from job advertisements. \
Identify the specific programming languages, frameworks, databases, cloud platforms, and tools \
the posting asks for. Respond ONLY with a JSON array of strings, for example \
[\"Rust\", \"PostgreSQL\", \"AWS\"]. Do not include soft skills, job titles, or explanations. \
Respond with [] if the text names no technologies.";

/// System prompt for salary normalization.
pub const SALARY_PROMPT: &str = "You normalize salary information from Australian job postings. \
Convert the pay text you are given into annual AUD amounts, assuming full-time hours when the \
rate is hourly or daily. Respond ONLY with a JSON array of exactly two numbers \
[minimum, maximum]. If only one figure is given use it for both. Respond with [0, 0] if the \
text contains no usable salary information.";

/// Timing and retry parameters for [`AnalysisClient`]. Tests shrink the
/// durations to zero; production uses the defaults.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Attempts consumed by rate-limit backoffs and transport errors.
    /// 403 rotation is free.
    pub max_retries: u32,
    /// Sleep between consumed attempts.
    pub retry_delay: Duration,
    /// Sleep after a full exhausted rotation, before resetting the pool.
    pub exhausted_wait: Duration,
    /// Abort once the pool has been continuously unusable for this long.
    pub failure_ceiling: Duration,
    /// Per-key exhaustion cooldown.
    pub cooldown: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
            exhausted_wait: Duration::from_secs(60),
            failure_ceiling: Duration::from_secs(5 * 60),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

pub struct AnalysisClient<T> {
    transport: T,
    pool: KeyPool,
    config: AnalysisConfig,
}

impl<T: AnalysisTransport> AnalysisClient<T> {
    pub fn new(transport: T, keys: Vec<String>) -> Self {
        Self::with_config(transport, keys, AnalysisConfig::default())
    }

    pub fn with_config(transport: T, keys: Vec<String>, config: AnalysisConfig) -> Self {
        let pool = KeyPool::new(keys).with_cooldown(config.cooldown);
        Self {
            transport,
            pool,
            config,
        }
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status(Instant::now())
    }

    /// Run one analysis request to completion, rotating keys as needed.
    pub async fn analyze(&mut self, prompt: &str, text: &str) -> Result<String, AppError> {
        if self.pool.is_empty() {
            return Err(AppError::ConfigError("no API keys configured".into()));
        }
        let text = if text.is_empty() {
            "No content provided."
        } else {
            text
        };

        let mut attempt: u32 = 0;
        // Keys that answered 429 within this call.
        let mut rate_limited: HashSet<usize> = HashSet::new();
        // Where the current exhausted-rotation began; None outside a rotation.
        let mut rotation_start: Option<usize> = None;

        loop {
            let now = Instant::now();
            self.pool.release_cooled(now);
            let key_index = self.pool.current_index();
            self.pool.record_request();

            match self
                .transport
                .send(self.pool.current_key(), prompt, text)
                .await
            {
                Ok(content) => {
                    self.pool.clear_outage();
                    return Ok(content);
                }
                Err(AppError::AnalysisError {
                    status_code: 403,
                    message,
                    ..
                }) => {
                    self.pool.record_error();
                    self.pool.mark_current_exhausted(now);
                    tracing::warn!(key = key_index, %message, "API key exhausted");

                    let start = *rotation_start.get_or_insert(key_index);
                    if self.pool.advance() == start {
                        // Full rotation: every key answered 403.
                        let outage = self.pool.outage_elapsed(now);
                        if outage > self.config.failure_ceiling {
                            tracing::error!(
                                outage_secs = outage.as_secs(),
                                ceiling_secs = self.config.failure_ceiling.as_secs(),
                                "All API keys continuously exhausted, giving up"
                            );
                            return Err(AppError::AllKeysExhausted);
                        }
                        tracing::warn!(
                            keys = self.pool.len(),
                            wait_secs = self.config.exhausted_wait.as_secs(),
                            outage_secs = outage.as_secs(),
                            "All keys exhausted, waiting before reset"
                        );
                        tokio::time::sleep(self.config.exhausted_wait).await;
                        self.pool.reset_all();
                        rotation_start = None;
                    }
                }
                Err(AppError::RateLimitExceeded) => {
                    self.pool.record_error();
                    rate_limited.insert(key_index);
                    tracing::warn!(key = key_index, "Rate limited");

                    if self.pool.rotate_available(&rate_limited, Instant::now()) {
                        continue;
                    }
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(AppError::RateLimitExceeded);
                    }
                    tracing::info!(
                        wait_secs = self.config.retry_delay.as_secs(),
                        attempt,
                        max_retries = self.config.max_retries,
                        "All keys rate limited, backing off"
                    );
                    rate_limited.clear();
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    self.pool.record_error();
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    tracing::warn!(
                        key = key_index,
                        error = %e,
                        attempt,
                        "Analysis request failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}

impl<T: AnalysisTransport> TextEnricher for AnalysisClient<T> {
    async fn extract_tech_stack(&mut self, text: &str) -> Result<Vec<String>, AppError> {
        let response = self.analyze(TECH_STACK_PROMPT, text).await?;
        match parse_string_list(&response) {
            Some(stack) => Ok(stack),
            None => {
                tracing::warn!(raw = %preview(&response), "Could not parse tech stack response");
                Ok(Vec::new())
            }
        }
    }

    async fn normalize_salary(&mut self, pay_range: &str) -> Result<(i32, i32), AppError> {
        let response = self.analyze(SALARY_PROMPT, pay_range).await?;
        match parse_salary_pair(&response) {
            Some(pair) => Ok(pair),
            None => {
                tracing::warn!(raw = %preview(&response), "Could not parse salary response");
                Ok((0, 0))
            }
        }
    }
}

/// Extract a JSON string array from a model response, tolerating prose
/// around the first `[` and last `]`.
pub fn parse_string_list(response: &str) -> Option<Vec<String>> {
    serde_json::from_str(bracketed(response)?).ok()
}

/// Extract a `[min, max]` numeric pair from a model response.
pub fn parse_salary_pair(response: &str) -> Option<(i32, i32)> {
    let values: Vec<f64> = serde_json::from_str(bracketed(response)?).ok()?;
    match values.as_slice() {
        [min, max] => Some((*min as i32, *max as i32)),
        _ => None,
    }
}

fn bracketed(response: &str) -> Option<&str> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

fn preview(response: &str) -> &str {
    let end = response
        .char_indices()
        .nth(120)
        .map_or(response.len(), |(i, _)| i);
    &response[..end]
}
