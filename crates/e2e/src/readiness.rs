//! Readiness gate - blocking until the service under test is operational

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use storefront_common::{ReadinessConfig, ReadinessSnapshot};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

/// Polls liveness and database readiness until both are healthy in the same
/// attempt. Runs once per worker before any other component.
pub struct ReadinessGate {
    client: Arc<dyn HttpClient>,
    config: ReadinessConfig,
}

fn field_str(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default()
}

fn flag_true(body: &Value) -> bool {
    body.get("ok").and_then(Value::as_bool) == Some(true)
}

/// Success status, `ok: true` and `status: "up"`
pub fn liveness_healthy(response: &HttpResponse) -> bool {
    let body = response.json();
    response.is_success() && flag_true(&body) && field_str(&body, "status") == "up"
}

/// Exactly 200, `ok: true` and `db: "up"`. Returns the reported db state too.
pub fn db_healthy(response: &HttpResponse) -> (bool, String) {
    let body = response.json();
    let state = field_str(&body, "db");
    let ready = response.status == 200 && flag_true(&body) && state == "up";
    (ready, state)
}

impl ReadinessGate {
    pub fn new(client: Arc<dyn HttpClient>, config: ReadinessConfig) -> Self {
        Self { client, config }
    }

    /// Block with the configured overall deadline
    pub async fn wait(&self) -> E2eResult<ReadinessSnapshot> {
        self.block_until_ready(self.config.deadline()).await
    }

    /// Poll until ready, the attempt budget runs out, or waiting again would
    /// pass `deadline`. Each signal is called at most once per attempt.
    pub async fn block_until_ready(&self, deadline: Duration) -> E2eResult<ReadinessSnapshot> {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let delay = self.config.retry_delay();
        let mut snapshot = ReadinessSnapshot::default();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            snapshot = self.probe().await;

            if snapshot.is_ready() {
                info!("Service ready after {} attempt(s) ({:?})", attempt, start.elapsed());
                return Ok(snapshot);
            }

            if attempt == 1 {
                info!("Waiting for service to become ready...");
            }
            debug!("Readiness attempt {}/{}: {}", attempt, max_attempts, snapshot);

            if attempt < max_attempts {
                if start.elapsed() + delay > deadline {
                    warn!("Readiness deadline of {:?} reached", deadline);
                    break;
                }
                sleep(delay).await;
            }
        }

        Err(E2eError::ReadinessTimeout { attempts, snapshot })
    }

    /// One attempt: both signals, each with its own timeout
    pub async fn probe(&self) -> ReadinessSnapshot {
        let mut snapshot = ReadinessSnapshot::default();

        match self.get(&self.config.liveness_path).await {
            Ok(response) => {
                snapshot.health_status = Some(response.status);
                snapshot.health_ready = liveness_healthy(&response);
            }
            Err(e) => snapshot.health_error = e,
        }

        match self.get(&self.config.db_path).await {
            Ok(response) => {
                let (ready, state) = db_healthy(&response);
                snapshot.db_status = Some(response.status);
                snapshot.db_ready = ready;
                snapshot.db_state = state;
            }
            Err(e) => snapshot.db_error = e,
        }

        snapshot
    }

    async fn get(&self, path: &str) -> Result<HttpResponse, String> {
        let request_timeout = self.config.request_timeout();
        let request = HttpRequest::get(path).accept_json().timeout(request_timeout);
        match timeout(request_timeout, self.client.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", request_timeout)),
        }
    }
}
