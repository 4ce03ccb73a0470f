//! End-to-end orchestration behavior: duplicate guard, email gating and
//! convergence under retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use reports::generator::DefaultReportGenerator;
use reports::mail::{MailError, Mailer, SentEmail};
use reports::models::email_log;
use reports::models::report;
use reports::orchestrator::ReportOrchestrator;
use reports::providers::Registry;
use reports::queue::{JobHandler, JobOutcome, ReportJob, ReportType};
use reports::repositories::{EmailLogRepository, ReportRepository, TokenRepository};
use reports::tokens::TokenLifecycle;

mod test_utils;
use test_utils::{insert_flagged_token, insert_token, setup_test_db};

/// Mailer that records every attempted send and can fail the first N.
struct CountingMailer {
    sends: AtomicU32,
    fail_first: u32,
    payloads: std::sync::Mutex<Vec<(String, String)>>,
}

impl CountingMailer {
    fn reliable() -> Self {
        Self {
            sends: AtomicU32::new(0),
            fail_first: 0,
            payloads: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn failing_first(n: u32) -> Self {
        Self {
            sends: AtomicU32::new(0),
            fail_first: n,
            payloads: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn sent_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }

    fn payloads(&self) -> Vec<(String, String)> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for CountingMailer {
    async fn send(&self, _to: &str, subject: &str, html: &str) -> Result<SentEmail, MailError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads
            .lock()
            .unwrap()
            .push((subject.to_string(), html.to_string()));
        if n <= self.fail_first {
            return Err(MailError::Network {
                detail: "connection reset".to_string(),
            });
        }
        Ok(SentEmail {
            message_id: format!("msg-{}", n),
        })
    }
}

fn build_orchestrator(
    db: &Arc<DatabaseConnection>,
    mailer: Arc<CountingMailer>,
) -> ReportOrchestrator {
    let registry = Arc::new(Registry::empty());
    let tokens = Arc::new(TokenLifecycle::new(
        TokenRepository::new(Arc::clone(db)),
        Arc::clone(&registry),
    ));

    ReportOrchestrator::new(
        tokens,
        registry,
        ReportRepository::new(Arc::clone(db)),
        EmailLogRepository::new(Arc::clone(db)),
        Arc::new(DefaultReportGenerator),
        mailer,
    )
}

fn daily_job(job_id: &str, user_id: Uuid) -> ReportJob {
    ReportJob {
        job_id: job_id.to_string(),
        user_id,
        user_email: "user@example.com".to_string(),
        report_type: ReportType::Daily,
        date: NaiveDate::from_ymd_opt(2025, 11, 20).unwrap(),
    }
}

async fn report_count(db: &DatabaseConnection, user_id: Uuid) -> u64 {
    report::Entity::find()
        .filter(report::Column::UserId.eq(user_id))
        .count(db)
        .await
        .unwrap()
}

async fn sent_email_count(db: &DatabaseConnection, user_id: Uuid) -> u64 {
    email_log::Entity::find()
        .filter(email_log::Column::UserId.eq(user_id))
        .filter(email_log::Column::Status.eq(email_log::STATUS_SENT))
        .count(db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_processing_same_identity_twice_yields_one_report_and_one_email() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let user_id = Uuid::new_v4();
    insert_token(&db, user_id, "spotify", Some("refresh"), None)
        .await
        .unwrap();

    let mailer = Arc::new(CountingMailer::reliable());
    let orchestrator = build_orchestrator(&db, Arc::clone(&mailer));

    let first = orchestrator.handle(&daily_job("job-a", user_id)).await.unwrap();
    assert!(matches!(first, JobOutcome::Completed));

    // A different job id for the same (user, date, kind) identity converges
    // on the existing report instead of producing a second one.
    let second = orchestrator.handle(&daily_job("job-b", user_id)).await.unwrap();
    match second {
        JobOutcome::Skipped { reason } => assert_eq!(reason, "report already exists"),
        other => panic!("expected skip, got {:?}", other),
    }

    assert_eq!(report_count(&db, user_id).await, 1);
    assert_eq!(sent_email_count(&db, user_id).await, 1);
    assert_eq!(mailer.sent_count(), 1);
}

#[tokio::test]
async fn test_no_working_integrations_skips() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let user_id = Uuid::new_v4();
    insert_flagged_token(&db, user_id, "spotify").await.unwrap();

    let mailer = Arc::new(CountingMailer::reliable());
    let orchestrator = build_orchestrator(&db, Arc::clone(&mailer));

    let outcome = orchestrator.handle(&daily_job("job-c", user_id)).await.unwrap();
    match outcome {
        JobOutcome::Skipped { reason } => assert_eq!(reason, "no working integrations"),
        other => panic!("expected skip, got {:?}", other),
    }

    assert_eq!(report_count(&db, user_id).await, 0);
    assert_eq!(mailer.sent_count(), 0);
}

#[tokio::test]
async fn test_email_failure_does_not_fail_job_and_retry_recovers() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let user_id = Uuid::new_v4();
    insert_token(&db, user_id, "spotify", Some("refresh"), None)
        .await
        .unwrap();

    let mailer = Arc::new(CountingMailer::failing_first(1));
    let orchestrator = build_orchestrator(&db, Arc::clone(&mailer));

    // First run: report persists, email send fails and is recorded as failed.
    let first = orchestrator.handle(&daily_job("job-d", user_id)).await.unwrap();
    assert!(matches!(first, JobOutcome::Completed));
    assert_eq!(report_count(&db, user_id).await, 1);
    assert_eq!(sent_email_count(&db, user_id).await, 0);

    let failed = email_log::Entity::find()
        .filter(email_log::Column::UserId.eq(user_id))
        .filter(email_log::Column::Status.eq(email_log::STATUS_FAILED))
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(failed, 1);

    // Second run converges: report exists, email goes out this time with the
    // same subject and body the first attempt tried to deliver.
    let second = orchestrator.handle(&daily_job("job-d2", user_id)).await.unwrap();
    assert!(matches!(second, JobOutcome::Skipped { .. }));
    assert_eq!(sent_email_count(&db, user_id).await, 1);

    let payloads = mailer.payloads();
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0], payloads[1]);

    // Third run: nothing more to send.
    orchestrator.handle(&daily_job("job-d3", user_id)).await.unwrap();
    assert_eq!(sent_email_count(&db, user_id).await, 1);
    assert_eq!(mailer.sent_count(), 2);
}

#[tokio::test]
async fn test_email_log_outage_does_not_fail_job() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let user_id = Uuid::new_v4();
    insert_token(&db, user_id, "spotify", Some("refresh"), None)
        .await
        .unwrap();

    // Break the email log entirely; the report pipeline must still complete.
    db.execute_unprepared("DROP TABLE email_log").await.unwrap();

    let mailer = Arc::new(CountingMailer::reliable());
    let orchestrator = build_orchestrator(&db, Arc::clone(&mailer));

    let outcome = orchestrator.handle(&daily_job("job-g", user_id)).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Completed));
    assert_eq!(report_count(&db, user_id).await, 1);

    // With the send gate unreadable nothing is dispatched, so a later run
    // against a healthy log can still deliver exactly once.
    assert_eq!(mailer.sent_count(), 0);
}

#[tokio::test]
async fn test_daily_and_weekly_reports_are_distinct_identities() {
    let db = Arc::new(setup_test_db().await.unwrap());
    let user_id = Uuid::new_v4();
    insert_token(&db, user_id, "spotify", Some("refresh"), None)
        .await
        .unwrap();

    let mailer = Arc::new(CountingMailer::reliable());
    let orchestrator = build_orchestrator(&db, Arc::clone(&mailer));

    let daily = daily_job("job-e", user_id);
    let weekly = ReportJob {
        job_id: "job-f".to_string(),
        report_type: ReportType::Weekly,
        ..daily.clone()
    };

    assert!(matches!(
        orchestrator.handle(&daily).await.unwrap(),
        JobOutcome::Completed
    ));
    assert!(matches!(
        orchestrator.handle(&weekly).await.unwrap(),
        JobOutcome::Completed
    ));

    assert_eq!(report_count(&db, user_id).await, 2);
    assert_eq!(sent_email_count(&db, user_id).await, 2);
}
