//! Account provisioning - exactly one usable account per worker identity

use std::sync::Arc;

use serde::Serialize;
use storefront_common::{ProvisioningConfig, TestIdentity};
use tracing::{debug, info};

use crate::auth::AuthApi;
use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpResponse};
use crate::retry::{retry, Attempt, RetryPolicy};

/// How the account came to be usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    Created,
    /// Registration reported a duplicate and login with the same credentials worked
    AlreadyExisted,
}

/// Duplicate-resource status with an "already exists" style message
pub fn is_conflict(response: &HttpResponse) -> bool {
    matches!(response.status, 400 | 409) && response.message().to_lowercase().contains("already")
}

pub struct AccountProvisioner {
    auth: AuthApi,
    config: ProvisioningConfig,
}

impl AccountProvisioner {
    pub fn new(client: Arc<dyn HttpClient>, config: ProvisioningConfig) -> Self {
        let auth = AuthApi::new(client).with_timeout(config.request_timeout());
        Self { auth, config }
    }

    /// Register the identity, or confirm an existing registration by logging
    /// in. The whole sequence is retried with linear backoff because the
    /// service may still be starting.
    pub async fn ensure_account(&self, identity: &TestIdentity) -> E2eResult<ProvisionOutcome> {
        let policy = RetryPolicy::linear(self.config.max_attempts, self.config.base_delay());

        let result = retry("provision", policy, |attempt| async move {
            debug!("Provisioning {} (attempt {})", identity.username, attempt);
            self.create_or_verify(identity).await
        })
        .await;

        match result {
            Ok(outcome) => {
                info!("Worker account {} ready ({:?})", identity.username, outcome);
                Ok(outcome)
            }
            Err(e) => Err(E2eError::Provisioning {
                username: identity.username.clone(),
                attempts: e.attempts(),
                last: e.reason().to_string(),
            }),
        }
    }

    async fn create_or_verify(&self, identity: &TestIdentity) -> Attempt<ProvisionOutcome> {
        let register = match self.auth.register(identity).await {
            Ok(response) => response,
            Err(e) => return Attempt::Retriable(e.to_string()),
        };

        if register.status == 201 {
            return Attempt::Success(ProvisionOutcome::Created);
        }

        if !is_conflict(&register) {
            return Attempt::Retriable(format!("register status {}", register.status));
        }

        let login = match self.auth.login(&identity.credentials()).await {
            Ok(response) => response,
            Err(e) => return Attempt::Retriable(format!("login after conflict: {e}")),
        };

        if login.status == 200 {
            self.auth.logout_quietly().await;
            Attempt::Success(ProvisionOutcome::AlreadyExisted)
        } else {
            Attempt::Retriable(format!(
                "register status {} (already exists), login status {}",
                register.status, login.status
            ))
        }
    }
}
