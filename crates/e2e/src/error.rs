//! Error types for the E2E support layer

use storefront_common::ReadinessSnapshot;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("[readiness] Service not ready after {attempts} attempts. {snapshot}.")]
    ReadinessTimeout {
        attempts: u32,
        snapshot: ReadinessSnapshot,
    },

    #[error("Failed to provision worker test user ({username}) after {attempts} attempts: {last}")]
    Provisioning {
        username: String,
        attempts: u32,
        last: String,
    },

    #[error(
        "No matching reset token found in {scope} (subject=\"{subject}\", requestedAt={requested_at_ms}, windowMs={window_ms}){}",
        render_last_error(.last_error)
    )]
    CorrelationNotFound {
        scope: String,
        subject: String,
        requested_at_ms: i64,
        window_ms: i64,
        last_error: Option<String>,
    },

    #[error("Unable to authenticate as {username} for mailbox lookup. Status: {status}")]
    Authentication { username: String, status: String },

    #[error(
        "Admin operation {operation} failed after {attempts} attempt(s) (status={}): {last}",
        render_status(.status)
    )]
    Operation {
        operation: String,
        attempts: u32,
        status: Option<u16>,
        last: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response from {path}: status {status}")]
    UnexpectedStatus { path: String, status: u16 },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Config error: {0}")]
    Config(#[from] storefront_common::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn render_last_error(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!("; last attempt: {e}"))
        .unwrap_or_default()
}

fn render_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "error".to_string(), |s| s.to_string())
}

impl E2eError {
    /// Failures that abort the whole worker rather than a single test
    pub fn is_fatal_for_worker(&self) -> bool {
        matches!(
            self,
            E2eError::ReadinessTimeout { .. } | E2eError::Provisioning { .. } | E2eError::Config(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
