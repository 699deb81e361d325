//! Reset-token correlation
//!
//! Locates the single message produced by one forgot-password request and
//! pulls its token out. Shared mailboxes may hold mail for every worker at
//! once, so correctness rests on subject, time window and recipient filtering
//! rather than on any locking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use storefront_common::{
    CorrelationWindow, Credentials, MailboxConfig, MailboxEntry, ResetToken, TestIdentity,
};
use tracing::{debug, info};

use super::extract::{HtmlMarkup, MailboxMarkup};
use super::{MailboxApi, MailboxView};
use crate::auth::AuthApi;
use crate::error::{E2eError, E2eResult};
use crate::http::HttpClient;
use crate::retry::{retry, Attempt, RetryPolicy};

/// Which mailbox a correlation reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxScope {
    /// The shared demo inbox. With an expected recipient, a message only
    /// counts if its body mentions that address.
    Shared { expected_recipient: Option<String> },
    /// The recipient's own inbox, read while logged in as them
    Identity { credentials: Credentials },
}

impl MailboxScope {
    pub fn view(&self) -> MailboxView {
        match self {
            MailboxScope::Shared { .. } => MailboxView::Shared,
            MailboxScope::Identity { .. } => MailboxView::Scoped,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MailboxScope::Shared { .. } => MailboxView::Shared.to_string(),
            MailboxScope::Identity { credentials } => {
                format!("{} of {}", MailboxView::Scoped, credentials.username)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorrelationRequest {
    /// When the message-producing request was sent
    pub requested_at: DateTime<Utc>,
    pub scope: MailboxScope,
    /// Overrides the configured subject marker
    pub subject_marker: Option<String>,
    /// Overrides the configured window length
    pub window: Option<Duration>,
}

impl CorrelationRequest {
    pub fn shared(requested_at: DateTime<Utc>) -> Self {
        Self {
            requested_at,
            scope: MailboxScope::Shared {
                expected_recipient: None,
            },
            subject_marker: None,
            window: None,
        }
    }

    /// Read the identity's own inbox
    pub fn for_identity(identity: &TestIdentity, requested_at: DateTime<Utc>) -> Self {
        Self {
            requested_at,
            scope: MailboxScope::Identity {
                credentials: identity.credentials(),
            },
            subject_marker: None,
            window: None,
        }
    }

    /// Require shared-inbox messages to mention `email`
    pub fn expecting_recipient(mut self, email: impl Into<String>) -> Self {
        if let MailboxScope::Shared { expected_recipient } = &mut self.scope {
            *expected_recipient = Some(email.into());
        }
        self
    }

    pub fn with_subject(mut self, marker: impl Into<String>) -> Self {
        self.subject_marker = Some(marker.into());
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = Some(window);
        self
    }
}

/// Entries admitted by the window, newest first
pub fn select_candidates(
    entries: Vec<MailboxEntry>,
    window: &CorrelationWindow,
) -> Vec<MailboxEntry> {
    let mut candidates: Vec<MailboxEntry> =
        entries.into_iter().filter(|e| window.admits(e)).collect();
    candidates.sort_by(|a, b| b.id.cmp(&a.id));
    candidates
}

pub struct MailboxCorrelator {
    mailbox: MailboxApi,
    auth: AuthApi,
    markup: Arc<dyn MailboxMarkup>,
    config: MailboxConfig,
}

impl MailboxCorrelator {
    pub fn new(client: Arc<dyn HttpClient>, config: MailboxConfig) -> E2eResult<Self> {
        let markup = Arc::new(HtmlMarkup::new(config.render_utc_offset_hours)?);
        Ok(Self::with_markup(client, config, markup))
    }

    pub fn with_markup(
        client: Arc<dyn HttpClient>,
        config: MailboxConfig,
        markup: Arc<dyn MailboxMarkup>,
    ) -> Self {
        let timeout = config.request_timeout();
        Self {
            mailbox: MailboxApi::new(client.clone()).with_timeout(timeout),
            auth: AuthApi::new(client).with_timeout(timeout),
            markup,
            config,
        }
    }

    pub fn window_for(&self, request: &CorrelationRequest) -> CorrelationWindow {
        let subject = request
            .subject_marker
            .clone()
            .unwrap_or_else(|| self.config.subject_marker.clone());
        CorrelationWindow::new(
            request.requested_at,
            request.window.unwrap_or_else(|| self.config.window()),
            self.config.clock_skew(),
            subject,
        )
    }

    /// Poll until a matching message yields a token.
    ///
    /// Identity-scoped requests log in first and log out exactly once on
    /// every return path, including a failed login. Logout is awaited after
    /// polling, so dropping this future mid-poll (e.g. under
    /// `tokio::time::timeout`) leaves the session logged in on the shared
    /// cookie jar. Bound the wait with `MailboxConfig::attempts` instead.
    pub async fn correlate(&self, request: &CorrelationRequest) -> E2eResult<ResetToken> {
        let window = self.window_for(request);

        match &request.scope {
            MailboxScope::Shared { .. } => self.poll(request, &window).await,
            MailboxScope::Identity { credentials } => {
                let result = self.poll_as(credentials, request, &window).await;
                self.auth.logout_quietly().await;
                result
            }
        }
    }

    async fn poll_as(
        &self,
        credentials: &Credentials,
        request: &CorrelationRequest,
        window: &CorrelationWindow,
    ) -> E2eResult<ResetToken> {
        let login = self.auth.login(credentials).await?;
        if login.status != 200 {
            return Err(E2eError::Authentication {
                username: credentials.username.clone(),
                status: login.status.to_string(),
            });
        }
        self.poll(request, window).await
    }

    async fn poll(&self, request: &CorrelationRequest, window: &CorrelationWindow) -> E2eResult<ResetToken> {
        let policy = RetryPolicy::fixed(self.config.attempts, self.config.poll_delay());

        let result = retry("mailbox", policy, |attempt| async move {
            debug!("Mailbox poll {} in {}", attempt, request.scope.describe());
            self.attempt(request, window).await
        })
        .await;

        match result {
            Ok(token) => {
                info!("Reset token found in {}", request.scope.describe());
                Ok(token)
            }
            Err(e) => Err(E2eError::CorrelationNotFound {
                scope: request.scope.describe(),
                subject: window.subject_filter.clone(),
                requested_at_ms: window.requested_at.timestamp_millis(),
                window_ms: window.window_ms(),
                last_error: Some(e.reason().to_string()).filter(|r| !r.is_empty()),
            }),
        }
    }

    async fn attempt(&self, request: &CorrelationRequest, window: &CorrelationWindow) -> Attempt<ResetToken> {
        let view = request.scope.view();

        let listing = match self.mailbox.list(view, None).await {
            Ok(response) if response.status == 200 => response,
            Ok(response) => {
                return Attempt::Retriable(format!("{} list status {}", view, response.status))
            }
            Err(e) => return Attempt::Retriable(format!("{} list: {}", view, e)),
        };

        let candidates = select_candidates(self.markup.extract_summaries(listing.text()), window);
        let total = candidates.len();

        for entry in candidates {
            if let Some(token) = self.token_from(&request.scope, view, &entry).await {
                debug!("Selected message {} ({})", entry.id, entry.subject);
                return Attempt::Success(token);
            }
        }

        Attempt::Retriable(format!("no token among {} candidate message(s)", total))
    }

    /// Token from one candidate, or `None` to move on to the next
    async fn token_from(
        &self,
        scope: &MailboxScope,
        view: MailboxView,
        entry: &MailboxEntry,
    ) -> Option<ResetToken> {
        let detail = match self.mailbox.detail(view, entry.id, None).await {
            Ok(response) if response.status == 200 => response,
            Ok(response) => {
                debug!("Skipping message {}: detail status {}", entry.id, response.status);
                return None;
            }
            Err(e) => {
                debug!("Skipping message {}: {}", entry.id, e);
                return None;
            }
        };

        let token = self.markup.extract_token(detail.text())?;

        if let MailboxScope::Shared {
            expected_recipient: Some(email),
        } = scope
        {
            let body = detail.text().to_lowercase();
            if !body.contains(&email.trim().to_lowercase()) {
                debug!("Skipping message {}: not addressed to {}", entry.id, email);
                return None;
            }
        }

        Some(token)
    }
}
