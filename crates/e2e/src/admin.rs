//! Administrative test hooks with bounded retry
//!
//! Every operation here is idempotent, so transient failures are retried.
//! Each operation names the one credential scope it needs; the general
//! test-access key and the inventory-reset key are never sent together.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use storefront_common::{AdminKeys, AdminRetryConfig};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::retry::{retry, Attempt, RetryError, RetryPolicy};

pub const TEST_API_KEY_HEADER: &str = "x-test-api-key";
pub const STOCK_RESET_KEY_HEADER: &str = "x-stock-reset-key";

/// Which administrative key an operation is authorized by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    /// Reset, seed and per-product stock overrides
    TestAccess,
    /// Inventory reset only
    StockReset,
}

impl CredentialScope {
    pub fn header(&self) -> &'static str {
        match self {
            CredentialScope::TestAccess => TEST_API_KEY_HEADER,
            CredentialScope::StockReset => STOCK_RESET_KEY_HEADER,
        }
    }

    fn key<'a>(&self, keys: &'a AdminKeys) -> Option<&'a str> {
        match self {
            CredentialScope::TestAccess => keys.test_api_key.as_deref(),
            CredentialScope::StockReset => keys.stock_reset_key.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOperation {
    /// Restore the storefront to its baseline state
    Reset,
    /// Load fixture data
    Seed,
    SetStock { product_id: u64, stock: i64 },
    /// Set every product's stock to one value
    ResetStock { stock: i64 },
}

impl AdminOperation {
    pub fn name(&self) -> &'static str {
        match self {
            AdminOperation::Reset => "reset",
            AdminOperation::Seed => "seed",
            AdminOperation::SetStock { .. } => "set-stock",
            AdminOperation::ResetStock { .. } => "reset-stock",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            AdminOperation::Reset => "/api/test/reset",
            AdminOperation::Seed => "/api/test/seed",
            AdminOperation::SetStock { .. } => "/api/test/set-stock",
            AdminOperation::ResetStock { .. } => "/api/test/reset-stock",
        }
    }

    pub fn scope(&self) -> CredentialScope {
        match self {
            AdminOperation::ResetStock { .. } => CredentialScope::StockReset,
            _ => CredentialScope::TestAccess,
        }
    }

    fn body(&self) -> Option<Value> {
        match self {
            AdminOperation::Reset | AdminOperation::Seed => None,
            AdminOperation::SetStock { product_id, stock } => {
                Some(json!({ "productId": product_id, "stock": stock }))
            }
            AdminOperation::ResetStock { stock } => Some(json!({ "stock": stock })),
        }
    }
}

/// Request timeout, rate limiting and server errors
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..=599).contains(&status)
}

pub struct AdminClient {
    client: Arc<dyn HttpClient>,
    keys: AdminKeys,
    config: AdminRetryConfig,
}

impl AdminClient {
    pub fn new(client: Arc<dyn HttpClient>, keys: AdminKeys, config: AdminRetryConfig) -> Self {
        Self {
            client,
            keys,
            config,
        }
    }

    /// Whether the key for `scope` is configured
    pub fn has_key(&self, scope: CredentialScope) -> bool {
        scope.key(&self.keys).is_some()
    }

    fn build(&self, operation: &AdminOperation) -> HttpRequest {
        let scope = operation.scope();
        let mut request = HttpRequest::post(operation.path())
            .accept_json()
            .timeout(self.config.request_timeout());
        match scope.key(&self.keys) {
            Some(key) => request = request.header(scope.header(), key),
            None => debug!(
                "No key configured for {}; sending without {}",
                operation.name(),
                scope.header()
            ),
        }
        if let Some(body) = operation.body() {
            request = request.json(body);
        }
        request
    }

    /// Run `operation`, retrying transient failures with linear backoff.
    /// Any other non-success status fails on the spot.
    pub async fn invoke(&self, operation: &AdminOperation) -> E2eResult<HttpResponse> {
        let policy = RetryPolicy::linear(self.config.max_attempts, self.config.base_delay());
        let last_status: Mutex<Option<u16>> = Mutex::new(None);

        let result = retry(operation.name(), policy, |_| {
            let request = self.build(operation);
            let last_status = &last_status;
            async move {
                match self.client.send(request).await {
                    Ok(response) => {
                        *last_status.lock() = Some(response.status);
                        classify(response)
                    }
                    Err(e) => {
                        *last_status.lock() = None;
                        Attempt::Retriable(e.to_string())
                    }
                }
            }
        })
        .await;
        let last_status = last_status.into_inner();

        match result {
            Ok(response) => {
                info!("Admin operation {} succeeded ({})", operation.name(), response.status);
                Ok(response)
            }
            Err(e) => Err(operation_error(operation, last_status, e)),
        }
    }

    pub async fn reset(&self) -> E2eResult<HttpResponse> {
        self.invoke(&AdminOperation::Reset).await
    }

    pub async fn seed(&self) -> E2eResult<HttpResponse> {
        self.invoke(&AdminOperation::Seed).await
    }

    pub async fn set_stock(&self, product_id: u64, stock: i64) -> E2eResult<HttpResponse> {
        self.invoke(&AdminOperation::SetStock { product_id, stock }).await
    }

    pub async fn reset_stock(&self, stock: i64) -> E2eResult<HttpResponse> {
        self.invoke(&AdminOperation::ResetStock { stock }).await
    }
}

fn classify(response: HttpResponse) -> Attempt<HttpResponse> {
    let status = response.status;
    if response.is_success() {
        Attempt::Success(response)
    } else if is_retriable_status(status) {
        Attempt::Retriable(format!("status {status}"))
    } else {
        let message = response.message();
        if message.is_empty() {
            Attempt::Fatal(format!("status {status}"))
        } else {
            Attempt::Fatal(format!("status {status}: {message}"))
        }
    }
}

fn operation_error(operation: &AdminOperation, status: Option<u16>, error: RetryError) -> E2eError {
    E2eError::Operation {
        operation: operation.name().to_string(),
        attempts: error.attempts(),
        status,
        last: error.reason().to_string(),
    }
}
