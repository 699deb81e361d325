//! Core types shared by the storefront E2E support layer

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A worker-scoped identity used to act as a distinct test user.
///
/// Computed once per worker process and never persisted. Two identities with
/// the same `(worker_index, run_token)` are always equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    pub worker_index: u32,
    pub run_token: String,
    /// Empty for fixed identities
    pub suffix: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

impl TestIdentity {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Username/password pair used for login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Single-use token carried by a password-reset message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResetToken(String);

impl ResetToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ResetToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a mailbox listing, as rendered by the mail view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxEntry {
    /// Monotonically increasing message id
    pub id: u64,
    pub subject: String,
    /// `None` when the rendered timestamp is missing or unparseable
    pub received_at: Option<DateTime<Utc>>,
}

/// Mailbox folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxBox {
    #[default]
    Inbox,
    Trash,
}

impl InboxBox {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxBox::Inbox => "inbox",
            InboxBox::Trash => "trash",
        }
    }
}

impl std::fmt::Display for InboxBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time range and subject filter used to locate one delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationWindow {
    pub requested_at: DateTime<Utc>,
    /// `requested_at` minus the tolerated clock skew
    pub from: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Subject marker as configured; matching is case-insensitive
    pub subject_filter: String,
}

impl CorrelationWindow {
    pub fn new(
        requested_at: DateTime<Utc>,
        window: std::time::Duration,
        clock_skew: std::time::Duration,
        subject_filter: impl Into<String>,
    ) -> Self {
        let window = Duration::from_std(window).unwrap_or(Duration::zero());
        let skew = Duration::from_std(clock_skew).unwrap_or(Duration::zero());
        Self {
            requested_at,
            from: requested_at - skew,
            deadline: requested_at + window,
            subject_filter: subject_filter.into(),
        }
    }

    pub fn window_ms(&self) -> i64 {
        (self.deadline - self.requested_at).num_milliseconds()
    }

    /// Subject contains the marker and the timestamp is unknown or in range.
    ///
    /// Unparseable timestamps are accepted; known out-of-range ones are not.
    pub fn admits(&self, entry: &MailboxEntry) -> bool {
        let marker = self.subject_filter.trim().to_lowercase();
        if !entry.subject.to_lowercase().contains(&marker) {
            return false;
        }
        match entry.received_at {
            None => true,
            Some(at) => at >= self.from && at <= self.deadline,
        }
    }
}

/// Last observed state of the readiness signals, overwritten every attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSnapshot {
    /// `None` when the request itself failed
    pub health_status: Option<u16>,
    pub health_ready: bool,
    pub health_error: String,
    pub db_status: Option<u16>,
    pub db_ready: bool,
    pub db_state: String,
    pub db_error: String,
}

impl ReadinessSnapshot {
    pub fn is_ready(&self) -> bool {
        self.health_ready && self.db_ready
    }
}

fn status_or_error(status: Option<u16>) -> String {
    status.map_or_else(|| "error".to_string(), |s| s.to_string())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

impl std::fmt::Display for ReadinessSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "health(status={}, ready={}, error=\"{}\"), db(status={}, ready={}, state=\"{}\", error=\"{}\")",
            status_or_error(self.health_status),
            self.health_ready,
            or_dash(&self.health_error),
            status_or_error(self.db_status),
            self.db_ready,
            or_dash(&self.db_state),
            or_dash(&self.db_error),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> CorrelationWindow {
        let requested_at = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        CorrelationWindow::new(
            requested_at,
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(1),
            "[RESET]",
        )
    }

    fn entry(subject: &str, received_at: Option<DateTime<Utc>>) -> MailboxEntry {
        MailboxEntry {
            id: 1,
            subject: subject.to_string(),
            received_at,
        }
    }

    #[test]
    fn test_window_bounds() {
        let w = window();
        assert_eq!((w.requested_at - w.from).num_milliseconds(), 1000);
        assert_eq!(w.window_ms(), 120_000);
    }

    #[test]
    fn test_admits_subject_case_insensitively() {
        let w = window();
        assert!(w.admits(&entry("[reset] Password reset request", Some(w.requested_at))));
        assert!(!w.admits(&entry("[ORDER] Your order", Some(w.requested_at))));
    }

    #[test]
    fn test_admits_skewed_but_not_stale() {
        let w = window();
        let skewed = w.requested_at - Duration::milliseconds(800);
        let stale = w.requested_at - Duration::minutes(5);
        let late = w.deadline + Duration::seconds(1);
        assert!(w.admits(&entry("[RESET] x", Some(skewed))));
        assert!(!w.admits(&entry("[RESET] x", Some(stale))));
        assert!(!w.admits(&entry("[RESET] x", Some(late))));
    }

    #[test]
    fn test_admits_unknown_timestamp() {
        assert!(window().admits(&entry("[RESET] x", None)));
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = ReadinessSnapshot {
            health_status: Some(503),
            db_error: "connection refused".to_string(),
            ..Default::default()
        };
        let rendered = snapshot.to_string();
        assert!(rendered.contains("health(status=503, ready=false, error=\"-\")"));
        assert!(rendered.contains("db(status=error, ready=false, state=\"-\", error=\"connection refused\")"));
    }
}
