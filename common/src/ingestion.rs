// Report ingestion: one normalized ticket into requester and report rows

use crate::db::store::ReportTransaction;
use crate::errors::{IngestionError, ValidationFailure};
use crate::models::{NormalizedTicket, Report, Requester};
use crate::parser::{parse_lenient_duration, parse_request_timestamp};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

pub const MAX_REQUESTER_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_RESPONDER_NAME_LEN: usize = 50;
pub const MAX_PROBLEM_LEN: usize = 255;
pub const MAX_CATEGORY_LEN: usize = 255;

static EMAIL: OnceLock<Regex> = OnceLock::new();

fn email_pattern() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
            .unwrap_or_else(|e| panic!("invalid email pattern: {e}"))
    })
}

/// A ticket that passed every field rule, with its typed values
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTicket {
    pub requester_name: String,
    pub requester_email: String,
    pub technician_name: String,
    pub request_date: NaiveDateTime,
    pub reported_problem: String,
    pub category: String,
    pub first_response_time: Duration,
    pub average_handling_time: Duration,
}

fn check_text(
    violations: &mut Vec<String>,
    field: &str,
    value: &str,
    required: bool,
    max_len: usize,
) {
    if required && value.is_empty() {
        violations.push(format!("{} is required", field));
    } else if value.chars().count() > max_len {
        violations.push(format!("{} must be at most {} characters", field, max_len));
    }
}

fn check_duration(violations: &mut Vec<String>, field: &str, value: Duration) {
    if i64::try_from(value.as_secs()).is_err() {
        violations.push(format!("{} is too large to store", field));
    }
}

/// Apply the field rules to one ticket, collecting every violation.
///
/// Request timestamps are wall-clock times of this deployment, so the
/// future-date check compares against `now` in the local time zone.
pub fn validate(
    ticket: &NormalizedTicket,
    now: DateTime<Utc>,
) -> Result<ValidatedTicket, ValidationFailure> {
    let mut violations = Vec::new();

    let requester_name = ticket.requester_name.trim();
    let requester_email = ticket.requester_email.trim();
    let technician_name = ticket.responder_name.trim();
    let reported_problem = ticket.reported_problem.trim();
    let category = ticket.category.trim();

    check_text(
        &mut violations,
        "requester name",
        requester_name,
        true,
        MAX_REQUESTER_NAME_LEN,
    );
    check_text(
        &mut violations,
        "requester email",
        requester_email,
        true,
        MAX_EMAIL_LEN,
    );
    if !requester_email.is_empty() && !email_pattern().is_match(requester_email) {
        violations.push(format!("requester email '{}' is not a valid address", requester_email));
    }
    check_text(
        &mut violations,
        "responder name",
        technician_name,
        false,
        MAX_RESPONDER_NAME_LEN,
    );
    check_text(
        &mut violations,
        "reported problem",
        reported_problem,
        true,
        MAX_PROBLEM_LEN,
    );
    check_text(&mut violations, "category", category, true, MAX_CATEGORY_LEN);

    let request_date =
        parse_request_timestamp(&ticket.request_date_raw, &ticket.first_message_time_raw);
    match request_date {
        None => violations.push(format!(
            "request date '{} {}' is not a valid timestamp",
            ticket.request_date_raw.trim(),
            ticket.first_message_time_raw.trim()
        )),
        Some(ts) if ts > now.with_timezone(&Local).naive_local() => {
            violations.push("request date cannot be in the future".to_string())
        }
        Some(_) => {}
    }

    let first_response_time = parse_lenient_duration(&ticket.first_response_time_raw);
    let average_handling_time = parse_lenient_duration(&ticket.total_handling_time_raw);
    check_duration(&mut violations, "first response time", first_response_time);
    check_duration(&mut violations, "total handling time", average_handling_time);

    match request_date {
        Some(request_date) if violations.is_empty() => Ok(ValidatedTicket {
            requester_name: requester_name.to_string(),
            requester_email: requester_email.to_string(),
            technician_name: technician_name.to_string(),
            request_date,
            reported_problem: reported_problem.to_string(),
            category: category.to_string(),
            first_response_time,
            average_handling_time,
        }),
        _ => Err(ValidationFailure { violations }),
    }
}

/// Converts tickets into rows staged on the caller's transaction.
///
/// Never commits; the job processor owns the transaction.
#[derive(Debug, Default, Clone)]
pub struct ReportIngestor;

impl ReportIngestor {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, tx, ticket), fields(requester_email = %ticket.requester_email))]
    pub async fn ingest(
        &self,
        tx: &mut dyn ReportTransaction,
        ticket: &NormalizedTicket,
        analysis_job_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Report, IngestionError> {
        let valid = validate(ticket, now)?;

        let requester = match tx.find_requester_by_email(&valid.requester_email).await? {
            Some(existing) => existing,
            None => {
                let requester = Requester::new(&valid.requester_name, &valid.requester_email);
                tx.insert_requester(&requester).await?;
                tracing::debug!(requester_id = %requester.id, "New requester staged");
                requester
            }
        };

        let report = Report {
            id: Uuid::new_v4(),
            requester_id: requester.id,
            analysis_job_id,
            technician_name: valid.technician_name,
            request_date: valid.request_date,
            reported_problem: valid.reported_problem,
            category: valid.category,
            first_response_time: valid.first_response_time,
            average_handling_time: valid.average_handling_time,
            created_at: now,
        };
        tx.insert_report(&report).await?;

        Ok(report)
    }
}
