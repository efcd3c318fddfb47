//! Audit logging for validation attempts.
//!
//! Certificate-request handling must leave an audit trail: exactly one
//! structured record per validation attempt, regardless of outcome, plus
//! audit-flagged announcements of the attempts themselves.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::types::Challenge;

/// Snapshot of one validation attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    /// Authorization id the attempt belongs to.
    pub id: String,
    /// Registration id of the requester.
    pub requester: i64,
    /// The challenge as it looked when the attempt finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Challenge>,
    pub request_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<DateTime<Utc>>,
    /// Companion error detail, set on any failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationRecord {
    /// Start a record for the authorization being validated.
    pub fn start(id: impl Into<String>, requester: i64) -> Self {
        Self {
            id: id.into(),
            requester,
            challenge: None,
            request_time: Utc::now(),
            response_time: None,
            error: None,
        }
    }
}

/// Sink for validation logging.
///
/// Structured records and audit-flagged text are destined for long-term
/// audit storage; notice and debug text is operational. Implementations
/// must be safe under concurrent emission.
pub trait AuditLogger: Send + Sync {
    /// Emit a structured validation record.
    fn audit_object(&self, summary: &str, record: &ValidationRecord);

    /// Emit audit-flagged text.
    fn audit(&self, message: &str);

    /// Operational notice.
    fn notice(&self, message: &str);

    /// Operational debug detail.
    fn debug(&self, message: &str);
}

/// `tracing`-backed audit logger.
///
/// Audit emissions go out under the `audit` target with an `audit = true`
/// field so subscribers can route them separately from operational logs.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn audit_object(&self, summary: &str, record: &ValidationRecord) {
        match serde_json::to_string(record) {
            Ok(json) => info!(target: "audit", audit = true, record = %json, "{}", summary),
            Err(e) => {
                error!(target: "audit", error = %e, "failed to serialize audit record: {}", summary)
            }
        }
    }

    fn audit(&self, message: &str) {
        info!(target: "audit", audit = true, "{}", message);
    }

    fn notice(&self, message: &str) {
        info!("{}", message);
    }

    fn debug(&self, message: &str) {
        debug!("{}", message);
    }
}
