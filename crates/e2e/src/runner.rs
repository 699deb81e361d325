//! Worker bootstrap that orchestrates identity, readiness and provisioning

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use storefront_common::{ReadinessSnapshot, ResetToken, RuntimeConfig, TestIdentity};
use tracing::{debug, error, info};

use crate::admin::AdminClient;
use crate::auth::AuthApi;
use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpResponse, ReqwestClient};
use crate::identity::{IdentityAllocator, RunContext};
use crate::mailbox::{CorrelationRequest, MailboxApi, MailboxCorrelator};
use crate::profile::RunPlan;
use crate::provision::{AccountProvisioner, ProvisionOutcome};
use crate::readiness::ReadinessGate;

/// Summary of a completed bootstrap
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub identity: TestIdentity,
    pub run_token: String,
    pub external_run_id: bool,
    pub readiness: String,
    /// `None` when auto-provisioning is off
    pub provisioned: Option<ProvisionOutcome>,
    pub duration_ms: u64,
}

/// Tokens consumed by one reset-and-restore password cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCycle {
    pub reset_token: ResetToken,
    pub restore_token: ResetToken,
}

/// Per-worker barrier: nothing else in the worker runs until `start`
/// returns. A failure here aborts the worker, not a single test.
pub struct WorkerBootstrap {
    config: RuntimeConfig,
}

impl WorkerBootstrap {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn allocator(&self) -> IdentityAllocator {
        IdentityAllocator::new(self.config.user.clone(), self.config.identity.mode)
    }

    /// Run context for this process
    pub fn run_context(&self, worker_index: u32) -> RunContext {
        RunContext::from_process(worker_index, self.config.identity.run_id.as_deref())
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan::from_config(&self.config)
    }

    /// Bootstrap against the configured base address
    pub async fn start(&self, run: RunContext) -> E2eResult<WorkerContext> {
        let client = ReqwestClient::new(&self.config.base_url, self.config.timeouts.request())?;
        self.start_with_client(Arc::new(client), run).await
    }

    pub async fn start_with_client(
        &self,
        client: Arc<dyn HttpClient>,
        run: RunContext,
    ) -> E2eResult<WorkerContext> {
        let start = Instant::now();
        let identity = self.allocator().compute(&run);
        let correlator = MailboxCorrelator::new(client.clone(), self.config.mailbox.clone())?;

        let readiness = ReadinessGate::new(client.clone(), self.config.readiness.clone())
            .wait()
            .await
            .map_err(|e| {
                error!("Worker {} aborted: {}", run.worker_index, e);
                e
            })?;

        let provisioned = if self.config.identity.auto_provision {
            let provisioner = AccountProvisioner::new(client.clone(), self.config.provisioning.clone());
            let outcome = provisioner.ensure_account(&identity).await.map_err(|e| {
                error!("Worker {} aborted: {}", run.worker_index, e);
                e
            })?;
            Some(outcome)
        } else {
            debug!("Auto-provisioning disabled; using {} as configured", identity.username);
            None
        };

        info!(
            "Worker {} ready as {} ({} ms)",
            run.worker_index,
            identity.username,
            start.elapsed().as_millis()
        );

        Ok(WorkerContext {
            auth: AuthApi::new(client.clone()).with_timeout(self.config.timeouts.request()),
            mailbox: MailboxApi::new(client.clone()).with_timeout(self.config.mailbox.request_timeout()),
            admin: AdminClient::new(
                client.clone(),
                self.config.admin.clone(),
                self.config.admin_retry.clone(),
            ),
            correlator,
            client,
            config: self.config.clone(),
            run,
            identity,
            readiness,
            provisioned,
            elapsed: start.elapsed(),
        })
    }
}

/// Everything a test needs once the worker is bootstrapped
pub struct WorkerContext {
    pub config: RuntimeConfig,
    pub run: RunContext,
    pub identity: TestIdentity,
    pub client: Arc<dyn HttpClient>,
    pub auth: AuthApi,
    pub mailbox: MailboxApi,
    pub admin: AdminClient,
    pub correlator: MailboxCorrelator,
    pub readiness: ReadinessSnapshot,
    pub provisioned: Option<ProvisionOutcome>,
    elapsed: Duration,
}

fn expect_ok(path: &str, response: HttpResponse) -> E2eResult<HttpResponse> {
    if response.status == 200 {
        Ok(response)
    } else {
        Err(E2eError::UnexpectedStatus {
            path: path.to_string(),
            status: response.status,
        })
    }
}

impl WorkerContext {
    pub fn report(&self) -> BootstrapReport {
        BootstrapReport {
            identity: self.identity.clone(),
            run_token: self.run.run_token.clone(),
            external_run_id: self.run.external,
            readiness: self.readiness.to_string(),
            provisioned: self.provisioned,
            duration_ms: self.elapsed.as_millis() as u64,
        }
    }

    /// Ask for a reset email and read its token from the identity's inbox,
    /// logging in with `current_password`.
    pub async fn request_reset_token(&self, current_password: &str) -> E2eResult<ResetToken> {
        let requested_at = Utc::now();
        let response = self.auth.forgot_password(&self.identity.email).await?;
        expect_ok(crate::auth::FORGOT_PASSWORD_PATH, response)?;

        let mut identity = self.identity.clone();
        identity.password = current_password.to_string();
        self.correlator
            .correlate(&CorrelationRequest::for_identity(&identity, requested_at))
            .await
    }

    /// Reset to `new_password`, prove the login works, then restore the
    /// original password with a second fresh token.
    pub async fn reset_password_cycle(&self, new_password: &str) -> E2eResult<PasswordCycle> {
        let original = self.identity.password.clone();
        let username = &self.identity.username;

        let reset_token = self.request_reset_token(&original).await?;
        let path = format!("{}/{}", crate::auth::RESET_PASSWORD_PATH, reset_token);
        expect_ok(&path, self.auth.validate_reset_token(reset_token.as_str()).await?)?;
        expect_ok(&path, self.auth.reset_password(reset_token.as_str(), new_password).await?)?;
        info!("Password for {} reset", username);

        let mut changed = self.identity.credentials();
        changed.password = new_password.to_string();
        let login = self.auth.login(&changed).await?;
        if login.status != 200 {
            return Err(E2eError::Authentication {
                username: username.clone(),
                status: login.status.to_string(),
            });
        }
        self.auth.logout_quietly().await;

        let restore_token = self.request_reset_token(new_password).await?;
        let path = format!("{}/{}", crate::auth::RESET_PASSWORD_PATH, restore_token);
        expect_ok(&path, self.auth.reset_password(restore_token.as_str(), &original).await?)?;
        info!("Password for {} restored", username);

        Ok(PasswordCycle {
            reset_token,
            restore_token,
        })
    }

    /// Password cycle through the configured `user.new_password`
    pub async fn configured_password_cycle(&self) -> E2eResult<PasswordCycle> {
        self.reset_password_cycle(&self.config.user.new_password).await
    }
}
