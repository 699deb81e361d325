//! Full worker barrier and password cycle against a scripted storefront

use std::sync::Arc;

use serde_json::json;
use storefront_common::{IdentityMode, RuntimeConfig};
use storefront_e2e::auth::{
    FORGOT_PASSWORD_PATH, LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH, RESET_PASSWORD_PATH,
};
use storefront_e2e::http::{HttpResponse, Method, RequestBody};
use storefront_e2e::testing::StubClient;
use storefront_e2e::{E2eError, ProvisionOutcome, RunContext, WorkerBootstrap};

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.identity.mode = IdentityMode::PerWorker;
    config.readiness.retry_delay_ms = 0;
    config.readiness.max_attempts = 3;
    config.provisioning.base_delay_ms = 0;
    config.mailbox.poll_delay_ms = 0;
    config.mailbox.attempts = 2;
    config
}

fn healthy(stub: &StubClient) {
    stub.on_get("/health", [HttpResponse::json_body(200, json!({"ok": true, "status": "up"}))]);
    stub.on_get("/health/db", [HttpResponse::json_body(200, json!({"ok": true, "db": "up"}))]);
}

#[tokio::test]
async fn barrier_runs_readiness_then_provisioning() {
    let stub = Arc::new(StubClient::new());
    healthy(&stub);
    stub.on_post(REGISTER_PATH, [HttpResponse::json_body(201, json!({"ok": true}))]);

    let bootstrap = WorkerBootstrap::new(config());
    let worker = bootstrap
        .start_with_client(stub.clone(), RunContext::new(2, "k3x9"))
        .await
        .unwrap();

    assert_eq!(worker.identity.username, "user_k3x9w2");
    assert_eq!(worker.provisioned, Some(ProvisionOutcome::Created));
    assert_eq!(stub.paths(), vec!["/health", "/health/db", REGISTER_PATH]);

    let report = worker.report();
    assert_eq!(report.run_token, "k3x9");
    assert!(!report.external_run_id);
}

#[tokio::test]
async fn auto_provision_off_skips_registration() {
    let stub = Arc::new(StubClient::new());
    healthy(&stub);

    let mut config = config();
    config.identity.auto_provision = false;
    let worker = WorkerBootstrap::new(config)
        .start_with_client(stub.clone(), RunContext::new(0, "k3x9"))
        .await
        .unwrap();

    assert_eq!(worker.provisioned, None);
    assert_eq!(stub.count(Method::Post, REGISTER_PATH), 0);
}

#[tokio::test]
async fn readiness_failure_prevents_provisioning() {
    let stub = Arc::new(StubClient::new());
    stub.on_get("/health", [HttpResponse::new(503, "down")]);
    stub.on_get("/health/db", [HttpResponse::new(503, "down")]);

    let result = WorkerBootstrap::new(config())
        .start_with_client(stub.clone(), RunContext::new(0, "k3x9"))
        .await;

    assert!(matches!(result, Err(E2eError::ReadinessTimeout { attempts: 3, .. })));
    assert_eq!(stub.count(Method::Post, REGISTER_PATH), 0);
}

#[tokio::test]
async fn password_cycle_uses_two_fresh_tokens() {
    let stub = Arc::new(StubClient::new());
    healthy(&stub);
    stub.on_post(REGISTER_PATH, [HttpResponse::json_body(201, json!({}))]);
    stub.on_post(FORGOT_PASSWORD_PATH, [HttpResponse::json_body(200, json!({"ok": true}))]);
    stub.on_post(LOGIN_PATH, [HttpResponse::json_body(200, json!({"ok": true}))]);

    let first = "1".repeat(32);
    let second = "2".repeat(32);
    let item = |id: u64| {
        format!(
            r#"<li data-testid="inbox-email-item-{id}"><span data-testid="inbox-email-subject-{id}">[RESET] Reset your password</span></li>"#
        )
    };
    stub.on_get(
        "/inbox",
        [
            HttpResponse::new(200, item(1)),
            HttpResponse::new(200, format!("{}{}", item(2), item(1))),
        ],
    );
    stub.on_get("/inbox/1", [HttpResponse::new(200, format!("/reset-password/{first}\""))]);
    stub.on_get("/inbox/2", [HttpResponse::new(200, format!("/reset-password/{second}\""))]);
    let validate_path = format!("{RESET_PASSWORD_PATH}/{first}");
    stub.on_get(&validate_path, [HttpResponse::json_body(200, json!({"ok": true}))]);
    stub.on_post(&validate_path, [HttpResponse::json_body(200, json!({"ok": true}))]);
    stub.on_post(
        &format!("{RESET_PASSWORD_PATH}/{second}"),
        [HttpResponse::json_body(200, json!({"ok": true}))],
    );

    let mut config = config();
    config.user.new_password = "rotated_pw".to_string();
    let worker = WorkerBootstrap::new(config)
        .start_with_client(stub.clone(), RunContext::new(0, "k3x9"))
        .await
        .unwrap();
    let cycle = worker.configured_password_cycle().await.unwrap();

    assert_eq!(cycle.reset_token.as_str(), first);
    assert_eq!(cycle.restore_token.as_str(), second);
    assert_eq!(stub.count(Method::Post, FORGOT_PASSWORD_PATH), 2);
    // Two scoped correlations plus the new-password login check
    assert_eq!(stub.count(Method::Post, LOGIN_PATH), 3);
    assert_eq!(stub.count(Method::Post, LOGOUT_PATH), 3);

    let reset_bodies: Vec<Option<RequestBody>> = stub
        .calls()
        .into_iter()
        .filter(|c| c.method == Method::Post && c.path.starts_with(RESET_PASSWORD_PATH))
        .map(|c| c.body)
        .collect();
    assert_eq!(
        reset_bodies,
        vec![
            Some(RequestBody::Json(json!({"password": "rotated_pw", "confirmPassword": "rotated_pw"}))),
            Some(RequestBody::Json(json!({"password": "user123", "confirmPassword": "user123"}))),
        ]
    );
}

#[tokio::test]
async fn out_of_range_render_offset_fails_before_network() {
    let stub = Arc::new(StubClient::new());
    healthy(&stub);

    let mut config = config();
    config.mailbox.render_utc_offset_hours = 1_000_000;
    let result = WorkerBootstrap::new(config)
        .start_with_client(stub.clone(), RunContext::new(0, "k3x9"))
        .await;

    assert!(matches!(result, Err(E2eError::Config(_))));
    assert!(stub.calls().is_empty());
}
