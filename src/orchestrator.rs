//! Report orchestration.
//!
//! Implements the end-to-end pipeline for one report job: duplicate guard,
//! token freshness, provider data fetch, report persistence and gated email
//! dispatch. The pipeline is written to converge under retries: every step
//! checks persistent state before producing side effects.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use crate::generator::ReportGenerator;
use crate::mail::Mailer;
use crate::models::report;
use crate::providers::Registry;
use crate::queue::{JobError, JobHandler, JobOutcome, ReportJob};
use crate::repositories::{EmailLogRepository, ReportRepository};
use crate::tokens::TokenLifecycle;

/// Drives one report job through the full pipeline.
pub struct ReportOrchestrator {
    tokens: Arc<TokenLifecycle>,
    registry: Arc<Registry>,
    reports: ReportRepository,
    email_log: EmailLogRepository,
    generator: Arc<dyn ReportGenerator>,
    mailer: Arc<dyn Mailer>,
}

impl ReportOrchestrator {
    pub fn new(
        tokens: Arc<TokenLifecycle>,
        registry: Arc<Registry>,
        reports: ReportRepository,
        email_log: EmailLogRepository,
        generator: Arc<dyn ReportGenerator>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            tokens,
            registry,
            reports,
            email_log,
            generator,
            mailer,
        }
    }

    /// Fetch provider payloads for every usable integration concurrently.
    ///
    /// A provider whose token could not be refreshed simply contributes no
    /// data; a fetch failure against a valid token is a transient job error.
    async fn fetch_provider_data(
        &self,
        job: &ReportJob,
    ) -> Result<BTreeMap<String, JsonValue>, JobError> {
        let usable = self.tokens.usable_tokens(job.user_id).await?;

        let mut handles = Vec::new();
        for token in usable {
            let Some(adapter) = self.registry.get(&token.provider_slug) else {
                warn!(provider = %token.provider_slug, "Token present for unconfigured provider");
                continue;
            };

            let adapter = Arc::clone(adapter);
            let access_token = token.access_token.clone();
            let slug = token.provider_slug.clone();
            let date = job.date;

            handles.push(tokio::spawn(async move {
                let result = adapter.fetch_data(&access_token, date).await;
                (slug, result)
            }));
        }

        let mut data = BTreeMap::new();
        for handle in handles {
            let (slug, result) = handle
                .await
                .map_err(|e| JobError::Transient(format!("fetch task panicked: {}", e)))?;

            match result {
                Ok(payload) => {
                    counter!("provider_fetch_success_total", "provider" => slug.clone())
                        .increment(1);
                    data.insert(slug, payload);
                }
                Err(err) => {
                    counter!("provider_fetch_failures_total", "provider" => slug.clone())
                        .increment(1);
                    return Err(JobError::Transient(format!(
                        "fetch from {} failed: {}",
                        slug, err
                    )));
                }
            }
        }

        Ok(data)
    }

    /// Send the report email unless the log shows it already went out.
    ///
    /// Failures anywhere in this step, from the log or from the mailer, are
    /// recorded and absorbed; the report itself stands and the job is never
    /// failed over mail delivery. When the gate cannot be read the send is
    /// skipped entirely, since dispatching without it risks a double-send.
    async fn dispatch_email(&self, job: &ReportJob, subject: &str, html: &str) {
        let kind = job.report_type.as_str();

        match self.email_log.find_sent(job.user_id, kind, job.date).await {
            Ok(Some(sent)) => {
                info!(
                    job_id = %job.job_id,
                    message_id = ?sent.message_id,
                    "Report email already sent, skipping dispatch"
                );
                return;
            }
            Ok(None) => {}
            Err(err) => {
                counter!("report_emails_failed_total").increment(1);
                warn!(
                    job_id = %job.job_id,
                    error = ?err,
                    "Email log lookup failed, skipping dispatch"
                );
                return;
            }
        }

        let entry = match self
            .email_log
            .create_pending(job.user_id, &job.user_email, kind, job.date)
            .await
        {
            Ok(entry) => entry,
            Err(err) => {
                counter!("report_emails_failed_total").increment(1);
                warn!(
                    job_id = %job.job_id,
                    error = ?err,
                    "Failed to record pending email, skipping dispatch"
                );
                return;
            }
        };

        match self.mailer.send(&job.user_email, subject, html).await {
            Ok(sent) => {
                counter!("report_emails_sent_total").increment(1);
                info!(job_id = %job.job_id, message_id = %sent.message_id, "Report email sent");
                if let Err(err) = self.email_log.mark_sent(entry.id, &sent.message_id).await {
                    warn!(job_id = %job.job_id, error = ?err, "Failed to record sent email");
                }
            }
            Err(err) => {
                counter!("report_emails_failed_total").increment(1);
                warn!(job_id = %job.job_id, error = %err, "Report email dispatch failed");
                if let Err(log_err) = self.email_log.mark_failed(entry.id, &err.to_string()).await {
                    warn!(error = ?log_err, "Failed to record email failure");
                }
            }
        }
    }

    /// Converge an already-persisted report: make sure its email goes out,
    /// then report the job as skipped.
    async fn converge_existing(&self, job: &ReportJob, existing: report::Model) -> JobOutcome {
        info!(
            job_id = %job.job_id,
            report_id = %existing.id,
            "Report already exists for identity"
        );

        // A prior attempt may have persisted the report but died before the
        // email went out; re-render from the stored document so the retry
        // sends the same email the original attempt would have.
        let provider_data = stored_provider_data(&existing.content);
        let generated =
            self.generator
                .generate(job.user_id, job.date, job.report_type, &provider_data);
        self.dispatch_email(job, &generated.email_subject, &generated.email_html)
            .await;

        JobOutcome::Skipped {
            reason: "report already exists".to_string(),
        }
    }
}

/// Provider payloads recovered from a stored report document.
fn stored_provider_data(content: &JsonValue) -> BTreeMap<String, JsonValue> {
    content
        .get("data")
        .and_then(JsonValue::as_object)
        .map(|data| data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

#[async_trait]
impl JobHandler for ReportOrchestrator {
    #[instrument(skip(self), fields(job_id = %job.job_id, user_id = %job.user_id))]
    async fn handle(&self, job: &ReportJob) -> Result<JobOutcome, JobError> {
        let kind = job.report_type.as_str();

        // Duplicate guard: one report per (user, date, kind).
        if let Some(existing) = self
            .reports
            .find_by_identity(job.user_id, job.date, kind)
            .await?
        {
            return Ok(self.converge_existing(job, existing).await);
        }

        // Refresh stale integrations; individual failures are tolerated as
        // long as at least one integration still works.
        let outcomes = self.tokens.ensure_fresh_tokens(job.user_id).await?;
        for outcome in &outcomes {
            if !outcome.success {
                warn!(
                    job_id = %job.job_id,
                    provider = %outcome.provider_slug,
                    reason = ?outcome.reason,
                    "Provider unavailable for this report"
                );
            }
        }

        if !self.tokens.has_working_integration(job.user_id).await? {
            return Ok(JobOutcome::Skipped {
                reason: "no working integrations".to_string(),
            });
        }

        let provider_data = self.fetch_provider_data(job).await?;

        let generated =
            self.generator
                .generate(job.user_id, job.date, job.report_type, &provider_data);

        let report = self
            .reports
            .insert_or_existing(job.user_id, job.date, kind, generated.content)
            .await?;

        counter!("reports_generated_total", "kind" => kind).increment(1);
        info!(job_id = %job.job_id, report_id = %report.id, "Report persisted");

        self.dispatch_email(job, &generated.email_subject, &generated.email_html)
            .await;

        Ok(JobOutcome::Completed)
    }
}
