//! Bounded enrichment queue and its single background consumer.
//!
//! Fetch workers hand successfully stored jobs to this queue and move on;
//! the consumer runs technology extraction and salary normalization at
//! whatever pace the analysis API allows. `enqueue` never blocks: overflow
//! is dropped with a warning so a stalled API can never slow the fetch pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::job::EnrichmentItem;
use crate::stats::RunStatistics;
use crate::traits::{JobStore, TextEnricher};

/// Bound on joining the consumer at teardown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

enum Msg {
    Item(EnrichmentItem),
    Shutdown,
}

/// Producer half, cloned into every fetch worker.
#[derive(Clone)]
pub struct EnrichmentSender {
    tx: mpsc::Sender<Msg>,
}

impl EnrichmentSender {
    /// Non-blocking enqueue. A full queue or a dead consumer drops the item
    /// with a warning; neither is an error for the caller.
    pub fn enqueue(&self, item: EnrichmentItem) {
        match self.tx.try_send(Msg::Item(item)) {
            Ok(()) => {}
            Err(TrySendError::Full(Msg::Item(item))) => {
                tracing::warn!(job_id = item.job_id, "Enrichment queue full, dropping item");
            }
            Err(TrySendError::Closed(Msg::Item(item))) => {
                tracing::warn!(
                    job_id = item.job_id,
                    "Enrichment worker stopped, dropping item"
                );
            }
            Err(_) => {}
        }
    }
}

/// Consumer half, held by the coordinator for shutdown.
pub struct EnrichmentWorker {
    tx: mpsc::Sender<Msg>,
    handle: JoinHandle<()>,
}

impl EnrichmentWorker {
    /// Unblock the consumer with a sentinel and join it with a bounded wait.
    pub async fn shutdown(mut self) {
        let _ = self.tx.send(Msg::Shutdown).await;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.handle).await {
            Ok(Ok(())) => tracing::debug!("Enrichment worker stopped"),
            Ok(Err(e)) => tracing::error!("Enrichment worker panicked: {e}"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                    "Enrichment worker did not stop in time, aborting"
                );
                self.handle.abort();
            }
        }
    }
}

/// Start the background consumer. Items flow `sender -> queue -> consumer`;
/// the consumer drains FIFO until the shutdown sentinel arrives.
pub fn spawn<E, S>(
    mut enricher: E,
    store: S,
    stats: Arc<RunStatistics>,
    capacity: usize,
) -> (EnrichmentSender, EnrichmentWorker)
where
    E: TextEnricher + 'static,
    S: JobStore + 'static,
{
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        // Set once the key pool is terminally exhausted; remaining items are
        // counted failed without more API calls, which would hit the same wall.
        let mut keys_gone = false;
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Shutdown => break,
                Msg::Item(item) => {
                    if keys_gone {
                        stats.record_enrichment_failure();
                        continue;
                    }
                    keys_gone = process_item(&mut enricher, &store, &stats, &item).await;
                }
            }
        }
    });
    (
        EnrichmentSender { tx: tx.clone() },
        EnrichmentWorker { tx, handle },
    )
}

/// Enrich one item. Both sub-steps run and are counted independently.
/// Returns true if the key pool is terminally exhausted.
async fn process_item<E, S>(
    enricher: &mut E,
    store: &S,
    stats: &RunStatistics,
    item: &EnrichmentItem,
) -> bool
where
    E: TextEnricher,
    S: JobStore,
{
    let mut keys_gone = false;

    match enricher.extract_tech_stack(&item.description).await {
        Ok(stack) if stack.is_empty() => {
            tracing::debug!(job_id = item.job_id, "No technologies found");
            stats.record_enrichment_success();
        }
        Ok(stack) => match store.update_tech_stack(item.job_id, &stack).await {
            Ok(()) => {
                tracing::info!(job_id = item.job_id, count = stack.len(), "Stored tech stack");
                stats.record_enrichment_success();
            }
            Err(e) => {
                tracing::error!(job_id = item.job_id, error = %e, "Failed to store tech stack");
                stats.record_enrichment_failure();
            }
        },
        Err(e) => {
            keys_gone = matches!(e, AppError::AllKeysExhausted);
            tracing::error!(job_id = item.job_id, error = %e, "Tech stack extraction failed");
            stats.record_enrichment_failure();
        }
    }

    let pay_range = item
        .pay_range
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(pay_range) = pay_range {
        if keys_gone {
            stats.record_salary_failure();
            return keys_gone;
        }
        match enricher.normalize_salary(pay_range).await {
            Ok((0, 0)) => {
                tracing::debug!(job_id = item.job_id, "No usable salary figures");
                stats.record_salary_skipped();
            }
            Ok((min, max)) => match store.update_salary(item.job_id, min, max).await {
                Ok(()) => {
                    tracing::info!(job_id = item.job_id, min, max, "Stored normalized salary");
                    stats.record_salary_normalized();
                }
                Err(e) => {
                    tracing::error!(job_id = item.job_id, error = %e, "Failed to store salary");
                    stats.record_salary_failure();
                }
            },
            Err(e) => {
                keys_gone = matches!(e, AppError::AllKeysExhausted);
                tracing::error!(job_id = item.job_id, error = %e, "Salary normalization failed");
                stats.record_salary_failure();
            }
        }
    }

    keys_gone
}

/// Synchronous sweep over stored jobs the async queue missed: rows with a
/// description but no tech stack, and rows with a pay range but no salary.
/// Runs after the fetch phase when enabled.
pub async fn run_post_pass<E, S>(
    enricher: &mut E,
    store: &S,
    stats: &RunStatistics,
    limit: Option<i64>,
) -> Result<(), AppError>
where
    E: TextEnricher,
    S: JobStore,
{
    let tech_jobs = store.tech_stack_candidates(limit).await?;
    tracing::info!(count = tech_jobs.len(), "Post pass: jobs missing tech stack");
    for (job_id, description) in tech_jobs {
        match enricher.extract_tech_stack(&description).await {
            Ok(stack) if stack.is_empty() => {
                tracing::debug!(job_id, "No technologies found");
                stats.record_enrichment_success();
            }
            Ok(stack) => match store.update_tech_stack(job_id, &stack).await {
                Ok(()) => {
                    tracing::info!(job_id, count = stack.len(), "Stored tech stack");
                    stats.record_enrichment_success();
                }
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Failed to store tech stack");
                    stats.record_enrichment_failure();
                }
            },
            Err(AppError::AllKeysExhausted) => {
                stats.record_enrichment_failure();
                return Err(AppError::AllKeysExhausted);
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Tech stack extraction failed");
                stats.record_enrichment_failure();
            }
        }
    }

    let zeroed = store.zero_empty_pay_ranges().await?;
    if zeroed > 0 {
        tracing::info!(count = zeroed, "Zeroed salary for jobs with no pay range");
    }

    let salary_jobs = store.salary_candidates(limit).await?;
    tracing::info!(count = salary_jobs.len(), "Post pass: jobs missing salary");
    for (job_id, pay_range) in salary_jobs {
        match enricher.normalize_salary(&pay_range).await {
            Ok((0, 0)) => {
                tracing::debug!(job_id, %pay_range, "No usable salary figures");
                stats.record_salary_skipped();
            }
            Ok((min, max)) => match store.update_salary(job_id, min, max).await {
                Ok(()) => {
                    tracing::info!(job_id, min, max, "Stored normalized salary");
                    stats.record_salary_normalized();
                }
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Failed to store salary");
                    stats.record_salary_failure();
                }
            },
            Err(AppError::AllKeysExhausted) => {
                stats.record_salary_failure();
                return Err(AppError::AllKeysExhausted);
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Salary normalization failed");
                stats.record_salary_failure();
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockEnricher, MockJobStore};

    fn item(job_id: i64, pay_range: Option<&str>) -> EnrichmentItem {
        EnrichmentItem {
            job_id,
            description: format!("description for {job_id}"),
            pay_range: pay_range.map(String::from),
        }
    }

    #[tokio::test]
    async fn worker_processes_items_in_order() {
        let enricher = MockEnricher::new()
            .with_tech_responses(vec![Ok(vec!["Rust".into()]), Ok(vec!["Go".into()])]);
        let store = MockJobStore::empty();
        let stats = Arc::new(RunStatistics::new());

        let (sender, worker) = spawn(enricher, store.clone(), Arc::clone(&stats), 10);
        sender.enqueue(item(1, None));
        sender.enqueue(item(2, None));
        worker.shutdown().await;

        let updates = store.tech_stack_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], (1, vec!["Rust".to_string()]));
        assert_eq!(updates[1], (2, vec!["Go".to_string()]));
        assert_eq!(stats.snapshot().enrichment_succeeded, 2);
    }

    #[tokio::test]
    async fn full_queue_drops_items_without_blocking() {
        // No consumer attached: the channel fills and stays full.
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EnrichmentSender { tx };

        sender.enqueue(item(1, None));
        sender.enqueue(item(2, None));
        sender.enqueue(item(3, None));

        // Only the first item made it in.
        assert!(matches!(rx.try_recv(), Ok(Msg::Item(i)) if i.job_id == 1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn salary_zero_pair_counts_as_skipped() {
        let enricher = MockEnricher::new()
            .with_tech_responses(vec![Ok(vec![])])
            .with_salary_responses(vec![Ok((0, 0))]);
        let store = MockJobStore::empty();
        let stats = Arc::new(RunStatistics::new());

        let (sender, worker) = spawn(enricher, store.clone(), Arc::clone(&stats), 10);
        sender.enqueue(item(5, Some("competitive")));
        worker.shutdown().await;

        let snap = stats.snapshot();
        assert_eq!(snap.salary_skipped, 1);
        assert_eq!(snap.salary_normalized, 0);
        assert!(store.salary_updates().is_empty());
    }

    #[tokio::test]
    async fn sub_step_failures_are_independent() {
        let enricher = MockEnricher::new()
            .with_tech_responses(vec![Err(AppError::NetworkError("reset".into()))])
            .with_salary_responses(vec![Ok((70000, 90000))]);
        let store = MockJobStore::empty();
        let stats = Arc::new(RunStatistics::new());

        let (sender, worker) = spawn(enricher, store.clone(), Arc::clone(&stats), 10);
        sender.enqueue(item(7, Some("$70k - $90k")));
        worker.shutdown().await;

        let snap = stats.snapshot();
        assert_eq!(snap.enrichment_failed, 1);
        assert_eq!(snap.salary_normalized, 1);
        assert_eq!(store.salary_updates(), vec![(7, 70000, 90000)]);
    }

    #[tokio::test]
    async fn terminal_exhaustion_stops_further_api_calls() {
        let enricher = MockEnricher::new()
            .with_tech_responses(vec![Err(AppError::AllKeysExhausted)]);
        let store = MockJobStore::empty();
        let stats = Arc::new(RunStatistics::new());

        let (sender, worker) = spawn(enricher, store.clone(), Arc::clone(&stats), 10);
        sender.enqueue(item(1, None));
        sender.enqueue(item(2, None));
        worker.shutdown().await;

        // Both items fail but only the first reached the enricher.
        assert_eq!(stats.snapshot().enrichment_failed, 2);
        assert!(store.tech_stack_updates().is_empty());
    }

    #[tokio::test]
    async fn post_pass_sweeps_tech_and_salary_candidates() {
        let store = MockJobStore::empty()
            .with_tech_candidates(vec![(1, "desc one".into()), (2, "desc two".into())])
            .with_salary_candidates(vec![(3, "$80k".into())]);
        let mut enricher = MockEnricher::new()
            .with_tech_responses(vec![Ok(vec!["Rust".into()]), Ok(vec![])])
            .with_salary_responses(vec![Ok((80000, 80000))]);
        let stats = RunStatistics::new();

        run_post_pass(&mut enricher, &store, &stats, None)
            .await
            .unwrap();

        assert_eq!(store.tech_stack_updates(), vec![(1, vec!["Rust".to_string()])]);
        assert_eq!(store.salary_updates(), vec![(3, 80000, 80000)]);
        let snap = stats.snapshot();
        assert_eq!(snap.enrichment_succeeded, 2);
        assert_eq!(snap.salary_normalized, 1);
    }

    #[tokio::test]
    async fn post_pass_surfaces_terminal_exhaustion() {
        let store = MockJobStore::empty().with_tech_candidates(vec![(1, "desc".into())]);
        let mut enricher =
            MockEnricher::new().with_tech_responses(vec![Err(AppError::AllKeysExhausted)]);
        let stats = RunStatistics::new();

        let err = run_post_pass(&mut enricher, &store, &stats, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AllKeysExhausted));
    }
}
