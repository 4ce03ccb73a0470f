//! Report document generation.
//!
//! The generated document is opaque to the rest of the pipeline; the
//! orchestrator persists whatever the generator returns and mails the subject
//! and HTML body alongside it.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::queue::ReportType;

/// A generated report ready for persistence and dispatch.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// Document stored in the reports table.
    pub content: JsonValue,
    /// Subject line of the report email.
    pub email_subject: String,
    /// HTML body of the report email.
    pub email_html: String,
}

/// Assembles a report from the per-provider payloads.
pub trait ReportGenerator: Send + Sync {
    fn generate(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        report_type: ReportType,
        provider_data: &BTreeMap<String, JsonValue>,
    ) -> GeneratedReport;
}

/// Default generator: bundles the raw provider payloads into a dated document.
pub struct DefaultReportGenerator;

impl ReportGenerator for DefaultReportGenerator {
    fn generate(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        report_type: ReportType,
        provider_data: &BTreeMap<String, JsonValue>,
    ) -> GeneratedReport {
        let providers: Vec<&String> = provider_data.keys().collect();

        let content = json!({
            "user_id": user_id,
            "date": date,
            "kind": report_type.as_str(),
            "generated_at": Utc::now(),
            "providers": providers,
            "data": provider_data,
        });

        let email_subject = format!(
            "Your {} wellness report for {}",
            report_type.as_str(),
            date
        );

        let mut sections = String::new();
        for slug in provider_data.keys() {
            sections.push_str(&format!("<li>{}</li>", slug));
        }

        let email_html = format!(
            "<html><body><h1>{}</h1><p>Covering data from:</p><ul>{}</ul></body></html>",
            email_subject, sections
        );

        GeneratedReport {
            content,
            email_subject,
            email_html,
        }
    }
}
