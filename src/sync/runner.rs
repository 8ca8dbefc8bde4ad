//! Job runner: runs the orchestrator off the request path and reports exactly
//! one terminal outcome per submission.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use scopeguard::ScopeGuard;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::error::SyncError;
use super::events::{EventPublisher, SyncEvent};
use super::orchestrator::{SyncOrchestrator, SyncOutcome};

pub type JobResult = Result<SyncOutcome, SyncError>;

/// Acknowledgment of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    /// Resolves with the same outcome as the terminal event.
    pub completion: oneshot::Receiver<JobResult>,
}

#[derive(Clone)]
pub struct JobRunner {
    orchestrator: Arc<SyncOrchestrator>,
    publisher: Arc<dyn EventPublisher>,
    active: Arc<Mutex<HashSet<i64>>>,
    reject_concurrent: bool,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("reject_concurrent", &self.reject_concurrent)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        publisher: Arc<dyn EventPublisher>,
        reject_concurrent: bool,
    ) -> Self {
        Self {
            orchestrator,
            publisher,
            active: Arc::new(Mutex::new(HashSet::new())),
            reject_concurrent,
        }
    }

    /// Whether a run is currently active for `user_id` in this process.
    pub fn is_active(&self, user_id: i64) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user_id)
    }

    /// Start a background sync. Blank codes are rejected before anything is spawned.
    pub fn submit(&self, code: &str) -> Result<JobHandle, SyncError> {
        let code = validate_code(code)?;
        let job_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let runner = self.clone();

        let span = tracing::info_span!("sync_job", %job_id);
        tokio::spawn(
            async move {
                let result = runner.run_to_completion(job_id, code).await;
                if tx.send(result).is_err() {
                    tracing::debug!("Completion receiver dropped");
                }
            }
            .instrument(span),
        );

        Ok(JobHandle {
            job_id,
            completion: rx,
        })
    }

    /// Run a job and wait for its outcome. Same guard and events as `submit`.
    ///
    /// The job runs on its own task, so dropping this future (a client hanging up
    /// mid-sync) leaves the run going and its terminal event still published.
    pub async fn run_inline(&self, code: &str) -> JobResult {
        let JobHandle { job_id, completion } = self.submit(code)?;
        completion.await.unwrap_or_else(|_| {
            Err(SyncError::JobAborted(format!(
                "job {} ended without reporting an outcome",
                job_id
            )))
        })
    }

    /// Execute inside a nested task so a panic surfaces at the join boundary.
    async fn run_to_completion(&self, job_id: Uuid, code: String) -> JobResult {
        let started = Instant::now();
        let runner = self.clone();
        let inner = tokio::spawn(
            async move { runner.execute(job_id, &code).await }.in_current_span(),
        );

        let result = inner.await.unwrap_or_else(|join_error| {
            tracing::error!(error = %join_error, "Sync job task aborted");
            Err(SyncError::JobAborted(join_error.to_string()))
        });

        self.report(job_id, started, result.as_ref()).await;
        result
    }

    async fn execute(&self, job_id: Uuid, code: &str) -> Result<SyncOutcome, SyncError> {
        let session = self.orchestrator.authenticate(code).await?;
        let _guard = self.acquire(session.identity.id)?;

        self.orchestrator.mark_in_progress(&session).await?;
        self.publisher
            .publish(SyncEvent::started(
                job_id,
                session.identity.id,
                &session.identity.login,
            ))
            .await;

        let report = self.orchestrator.sync_hierarchy(&session).await;
        let integration = self.orchestrator.finalize(&session).await?;
        Ok(SyncOutcome {
            integration,
            report,
        })
    }

    /// Claim the per-identity slot; released when the guard drops, including on panic.
    fn acquire(
        &self,
        user_id: i64,
    ) -> Result<Option<ScopeGuard<i64, impl FnOnce(i64)>>, SyncError> {
        if !self.reject_concurrent {
            return Ok(None);
        }

        let inserted = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id);
        if !inserted {
            return Err(SyncError::AlreadyRunning { user_id });
        }

        let active = Arc::clone(&self.active);
        Ok(Some(scopeguard::guard(user_id, move |user_id| {
            active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&user_id);
        })))
    }

    /// Publish the single terminal event and record run metrics.
    async fn report(
        &self,
        job_id: Uuid,
        started: Instant,
        result: Result<&SyncOutcome, &SyncError>,
    ) {
        metrics::histogram!("github_sync_run_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        let event = match result {
            Ok(outcome) => {
                metrics::counter!("github_sync_runs_total", "outcome" => "completed").increment(1);
                match serde_json::to_value(outcome) {
                    Ok(payload) => SyncEvent::completed(job_id, payload),
                    Err(err) => SyncEvent::failed(job_id, 500, format!("unserializable outcome: {}", err)),
                }
            }
            Err(error) => {
                metrics::counter!("github_sync_runs_total", "outcome" => "failed").increment(1);
                SyncEvent::failed(job_id, error.event_status(), error.to_string())
            }
        };

        tracing::info!(job_id = %job_id, status = event.status, "Sync job finished");
        self.publisher.publish(event).await;
    }
}

fn validate_code(code: &str) -> Result<String, SyncError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(SyncError::AuthExchangeFailed(
            "authorization code is required".to_string(),
        ));
    }
    Ok(code.to_string())
}
