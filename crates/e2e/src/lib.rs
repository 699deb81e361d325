//! Storefront E2E support layer
//!
//! The pieces a browser suite needs before and around its tests:
//! - Worker identities that never collide within a run
//! - A readiness barrier over liveness and database health
//! - Idempotent provisioning of the worker's account
//! - Reset-token correlation against the storefront mail view
//! - Retried administrative test hooks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WorkerBootstrap (per process)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IdentityAllocator::compute(RunContext) -> TestIdentity     │
//! │  ReadinessGate::wait()                  -> barrier          │
//! │  AccountProvisioner::ensure_account()   -> barrier          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WorkerContext                                              │
//! │    ├── MailboxCorrelator::correlate() -> ResetToken         │
//! │    ├── AdminClient::invoke(AdminOperation)                  │
//! │    └── AuthApi / MailboxApi                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HttpClient (ReqwestClient | testing::StubClient)           │
//! │  retry(label, RetryPolicy, op) -> Attempt                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod auth;
pub mod error;
pub mod http;
pub mod identity;
pub mod mailbox;
pub mod profile;
pub mod provision;
pub mod readiness;
pub mod retry;
pub mod runner;
pub mod testing;

pub use admin::{AdminClient, AdminOperation, CredentialScope};
pub use auth::AuthApi;
pub use error::{E2eError, E2eResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use identity::{IdentityAllocator, RunContext, UniqueAccount};
pub use mailbox::{CorrelationRequest, MailboxApi, MailboxCorrelator, MailboxScope};
pub use profile::{BrowserTimeouts, ExecutionProfile, RunPlan, TagFilter};
pub use provision::{AccountProvisioner, ProvisionOutcome};
pub use readiness::ReadinessGate;
pub use retry::{retry, Attempt, RetryPolicy};
pub use runner::{BootstrapReport, PasswordCycle, WorkerBootstrap, WorkerContext};
