//! Idempotent report job queue.
//!
//! Jobs are deduplicated by `job_id`: re-enqueueing a known id acknowledges
//! the submission without dispatching a second execution. Transient failures
//! are retried with exponential backoff and jitter up to the configured
//! attempt cap; terminal failures fail the job immediately. Each attempt runs
//! under a deadline, and a deadline overrun counts as a transient failure.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lru::LruCache;
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::QueueConfig;

/// Report cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Daily,
    Weekly,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Daily => "daily",
            ReportType::Weekly => "weekly",
        }
    }
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReportType::Daily),
            "weekly" => Ok(ReportType::Weekly),
            other => Err(format!("unknown report type: {}", other)),
        }
    }
}

/// A report generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    pub job_id: String,
    pub user_id: Uuid,
    pub user_email: String,
    pub report_type: ReportType,
    pub date: NaiveDate,
}

/// Lifecycle states of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

/// Tracked state for a job id.
#[derive(Debug, Clone)]
pub struct JobState {
    pub status: JobStatus,
    pub reason: Option<String>,
    pub attempts: u32,
}

/// Errors a job handler can return.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Worth retrying: network failures, provider 5xx, timeouts.
    #[error("transient job failure: {0}")]
    Transient(String),

    /// Not worth retrying: malformed input, missing prerequisites.
    #[error("terminal job failure: {0}")]
    Terminal(String),
}

impl From<DbErr> for JobError {
    fn from(err: DbErr) -> Self {
        JobError::Transient(format!("database error: {}", err))
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Transient(err.to_string())
    }
}

/// Successful handler outcomes.
#[derive(Debug)]
pub enum JobOutcome {
    /// A report was produced (or already existed and the job converged).
    Completed,
    /// Nothing to do; the reason is surfaced through job status.
    Skipped { reason: String },
}

/// Processes one job attempt.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ReportJob) -> Result<JobOutcome, JobError>;
}

/// Result of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnqueueAck {
    /// Job accepted and dispatched.
    Accepted,
    /// Job id already known; no new execution dispatched.
    Duplicate,
}

/// In-process job queue with id-based deduplication.
pub struct ReportQueue {
    handler: Arc<dyn JobHandler>,
    states: Mutex<LruCache<String, JobState>>,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
    shutdown: CancellationToken,
}

impl ReportQueue {
    pub fn new(
        handler: Arc<dyn JobHandler>,
        config: QueueConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let capacity =
            NonZeroUsize::new(config.dedup_capacity).unwrap_or(NonZeroUsize::new(1024).unwrap());

        Arc::new(Self {
            handler,
            states: Mutex::new(LruCache::new(capacity)),
            semaphore: Arc::new(Semaphore::new(config.concurrency as usize)),
            config,
            shutdown,
        })
    }

    /// Submit a job. A job id that has been seen before is acknowledged as a
    /// duplicate and not dispatched again, regardless of its current state.
    pub fn enqueue(self: &Arc<Self>, job: ReportJob) -> EnqueueAck {
        {
            let mut states = self.states.lock().expect("job state lock poisoned");
            if states.contains(&job.job_id) {
                counter!("report_jobs_deduplicated_total").increment(1);
                info!(job_id = %job.job_id, "Duplicate job submission acknowledged");
                return EnqueueAck::Duplicate;
            }

            states.put(
                job.job_id.clone(),
                JobState {
                    status: JobStatus::Pending,
                    reason: None,
                    attempts: 0,
                },
            );
        }

        counter!("report_jobs_enqueued_total").increment(1);

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            queue.run_job(job).await;
        });

        EnqueueAck::Accepted
    }

    /// Current state for a job id, if it is still in the cache.
    pub fn status(&self, job_id: &str) -> Option<JobState> {
        let mut states = self.states.lock().expect("job state lock poisoned");
        states.get(job_id).cloned()
    }

    fn set_state(&self, job_id: &str, status: JobStatus, reason: Option<String>, attempts: u32) {
        let mut states = self.states.lock().expect("job state lock poisoned");
        states.put(
            job_id.to_string(),
            JobState {
                status,
                reason,
                attempts,
            },
        );
    }

    /// Execute a job with retry, backoff and a per-attempt deadline.
    async fn run_job(self: Arc<Self>, job: ReportJob) {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return, // queue shut down
        };

        gauge!("report_jobs_in_flight").increment(1.0);
        let started = std::time::Instant::now();

        self.set_state(&job.job_id, JobStatus::Processing, None, 0);

        let deadline = Duration::from_secs(self.config.job_deadline_seconds);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.set_state(&job.job_id, JobStatus::Processing, None, attempt);

            let result = match tokio::time::timeout(deadline, self.handler.handle(&job)).await {
                Ok(result) => result,
                Err(_) => Err(JobError::Transient(format!(
                    "attempt exceeded {}s deadline",
                    self.config.job_deadline_seconds
                ))),
            };

            match result {
                Ok(JobOutcome::Completed) => {
                    counter!("report_jobs_completed_total").increment(1);
                    info!(job_id = %job.job_id, attempt, "Report job completed");
                    self.set_state(&job.job_id, JobStatus::Completed, None, attempt);
                    break;
                }
                Ok(JobOutcome::Skipped { reason }) => {
                    counter!("report_jobs_skipped_total").increment(1);
                    info!(job_id = %job.job_id, reason = %reason, "Report job skipped");
                    self.set_state(&job.job_id, JobStatus::Skipped, Some(reason), attempt);
                    break;
                }
                Err(JobError::Terminal(reason)) => {
                    counter!("report_jobs_failed_total", "kind" => "terminal").increment(1);
                    error!(job_id = %job.job_id, reason = %reason, "Report job failed terminally");
                    self.set_state(&job.job_id, JobStatus::Failed, Some(reason), attempt);
                    break;
                }
                Err(JobError::Transient(reason)) => {
                    if attempt >= self.config.max_attempts {
                        counter!("report_jobs_failed_total", "kind" => "exhausted").increment(1);
                        error!(
                            job_id = %job.job_id,
                            attempts = attempt,
                            reason = %reason,
                            "Report job failed after exhausting retries"
                        );
                        self.set_state(&job.job_id, JobStatus::Failed, Some(reason), attempt);
                        break;
                    }

                    let delay = self.backoff_delay(attempt);
                    warn!(
                        job_id = %job.job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Transient job failure, retrying"
                    );
                    counter!("report_jobs_retried_total").increment(1);

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            self.set_state(
                                &job.job_id,
                                JobStatus::Failed,
                                Some("shutdown before retry".to_string()),
                                attempt,
                            );
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        gauge!("report_jobs_in_flight").decrement(1.0);
        histogram!("report_job_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
    }

    /// Exponential backoff with jitter: base * 2^(attempt-1), +/-20%.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.retry_base_seconds * 1_000;
        let backoff_ms = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((backoff_ms as f64 * jitter) as u64)
    }
}
