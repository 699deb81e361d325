//! Reset-token correlation against scripted mail views

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use storefront_common::{Credentials, MailboxConfig, ResetToken};
use storefront_e2e::auth::{LOGIN_PATH, LOGOUT_PATH};
use storefront_e2e::http::{HttpResponse, Method};
use storefront_e2e::testing::StubClient;
use storefront_e2e::{CorrelationRequest, E2eError, MailboxCorrelator, MailboxScope};

fn requested_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

/// Timestamp as the mail view renders it, in its fixed +7 offset
fn rendered(at: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(7 * 3600).unwrap();
    at.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn item(id: u64, subject: &str, time: &str) -> String {
    format!(
        r#"<li class="inbox-item" data-testid="inbox-email-item-{id}">
  <a href="/demo-inbox/{id}">
    <span data-testid="inbox-email-subject-{id}">{subject}</span>
    <span data-testid="inbox-email-time-{id}">{time}</span>
  </a>
</li>"#
    )
}

fn listing(items: &[String]) -> HttpResponse {
    HttpResponse::new(200, format!("<ul>{}</ul>", items.concat()))
}

fn token(c: char) -> String {
    std::iter::repeat(c).take(40).collect()
}

fn detail(token: &str, recipient: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        format!(
            r#"<article><p>To: {recipient}</p><a href="http://localhost:3000/reset-password/{token}">Reset</a></article>"#
        ),
    )
}

fn fast_config() -> MailboxConfig {
    MailboxConfig {
        attempts: 3,
        poll_delay_ms: 0,
        ..MailboxConfig::default()
    }
}

fn correlator(stub: &Arc<StubClient>) -> MailboxCorrelator {
    MailboxCorrelator::new(stub.clone(), fast_config()).unwrap()
}

fn scoped_request() -> CorrelationRequest {
    CorrelationRequest {
        requested_at: requested_at(),
        scope: MailboxScope::Identity {
            credentials: Credentials {
                username: "user_k3x9w0".to_string(),
                password: "user123".to_string(),
            },
        },
        subject_marker: None,
        window: None,
    }
}

#[tokio::test]
async fn newest_matching_message_wins() {
    let stub = Arc::new(StubClient::new());
    let at = rendered(requested_at() + Duration::seconds(5));
    stub.on_get(
        "/demo-inbox",
        [listing(&[
            item(5, "[RESET] Password reset", &at),
            item(3, "[RESET] Password reset", &at),
            item(7, "[RESET] Password reset", &at),
        ])],
    );
    stub.on_get("/demo-inbox/5", [detail(&token('a'), "x")]);
    stub.on_get("/demo-inbox/3", [detail(&token('b'), "x")]);
    stub.on_get("/demo-inbox/7", [detail(&token('c'), "x")]);

    let found = correlator(&stub)
        .correlate(&CorrelationRequest::shared(requested_at()))
        .await
        .unwrap();

    assert_eq!(found, ResetToken::new(token('c')));
    assert_eq!(stub.count(Method::Get, "/demo-inbox/5"), 0);
    assert_eq!(stub.count(Method::Get, "/demo-inbox/3"), 0);
}

#[tokio::test]
async fn stale_message_excluded_and_unparseable_date_kept() {
    let stub = Arc::new(StubClient::new());
    let stale = rendered(requested_at() - Duration::seconds(1) - Duration::minutes(5));
    stub.on_get(
        "/demo-inbox",
        [listing(&[
            item(9, "[RESET] Password reset", &stale),
            item(4, "[RESET] Password reset", "sometime soon"),
            item(8, "Order confirmation", &rendered(requested_at())),
        ])],
    );
    stub.on_get("/demo-inbox/9", [detail(&token('d'), "x")]);
    stub.on_get("/demo-inbox/4", [detail(&token('e'), "x")]);
    stub.on_get("/demo-inbox/8", [detail(&token('f'), "x")]);

    let found = correlator(&stub)
        .correlate(&CorrelationRequest::shared(requested_at()))
        .await
        .unwrap();

    assert_eq!(found.as_str(), token('e'));
    assert_eq!(stub.count(Method::Get, "/demo-inbox/9"), 0);
    assert_eq!(stub.count(Method::Get, "/demo-inbox/8"), 0);
}

#[tokio::test]
async fn failed_detail_is_skipped_not_fatal() {
    let stub = Arc::new(StubClient::new());
    let at = rendered(requested_at());
    stub.on_get(
        "/demo-inbox",
        [listing(&[item(7, "[RESET]", &at), item(6, "[RESET]", &at), item(5, "[RESET]", &at)])],
    );
    stub.on_get("/demo-inbox/7", [HttpResponse::new(500, "boom")]);
    stub.on_get("/demo-inbox/6", [HttpResponse::new(200, "<p>no link</p>")]);
    stub.on_get("/demo-inbox/5", [detail(&token('a'), "x")]);

    let found = correlator(&stub)
        .correlate(&CorrelationRequest::shared(requested_at()))
        .await
        .unwrap();

    assert_eq!(found.as_str(), token('a'));
    assert_eq!(stub.count(Method::Get, "/demo-inbox"), 1);
}

#[tokio::test]
async fn message_arriving_on_later_poll_is_found() {
    let stub = Arc::new(StubClient::new());
    let at = rendered(requested_at());
    stub.on_get(
        "/demo-inbox",
        [
            HttpResponse::new(200, "<p>Inbox is empty</p>"),
            HttpResponse::new(503, "busy"),
            listing(&[item(2, "[RESET]", &at)]),
        ],
    );
    stub.on_get("/demo-inbox/2", [detail(&token('b'), "x")]);

    let found = correlator(&stub)
        .correlate(&CorrelationRequest::shared(requested_at()))
        .await
        .unwrap();

    assert_eq!(found.as_str(), token('b'));
    assert_eq!(stub.count(Method::Get, "/demo-inbox"), 3);
}

#[tokio::test]
async fn shared_mailbox_requires_expected_recipient() {
    let stub = Arc::new(StubClient::new());
    let at = rendered(requested_at());
    stub.on_get(
        "/demo-inbox",
        [listing(&[item(8, "[RESET]", &at), item(6, "[RESET]", &at)])],
    );
    stub.on_get("/demo-inbox/8", [detail(&token('a'), "user+other@needlymart.com")]);
    stub.on_get("/demo-inbox/6", [detail(&token('b'), "USER+K3X9W0@needlymart.com")]);

    let request = CorrelationRequest::shared(requested_at()).expecting_recipient("user+k3x9w0@needlymart.com");
    let found = correlator(&stub).correlate(&request).await.unwrap();

    assert_eq!(found.as_str(), token('b'));
}

#[tokio::test]
async fn no_token_fails_with_diagnostics() {
    let stub = Arc::new(StubClient::new());
    let at = rendered(requested_at());
    stub.on_get("/demo-inbox", [listing(&[item(3, "[RESET] Password reset", &at)])]);
    stub.on_get("/demo-inbox/3", [HttpResponse::new(200, "<p>expired</p>")]);

    let err = correlator(&stub)
        .correlate(&CorrelationRequest::shared(requested_at()))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, E2eError::CorrelationNotFound { .. }));
    assert!(message.contains("[RESET]"), "{message}");
    assert!(message.contains(&requested_at().timestamp_millis().to_string()), "{message}");
    assert!(message.contains("windowMs=120000"), "{message}");
    assert!(message.contains("demo inbox"), "{message}");
    assert_eq!(stub.count(Method::Get, "/demo-inbox"), 3);
}

#[tokio::test]
async fn scoped_success_logs_out_once() {
    let stub = Arc::new(StubClient::new());
    stub.on_post(LOGIN_PATH, [HttpResponse::new(200, "{}")]);
    stub.on_get("/inbox", [listing(&[item(11, "[RESET]", "")])]);
    stub.on_get("/inbox/11", [detail(&token('c'), "no address shown")]);

    let found = correlator(&stub).correlate(&scoped_request()).await.unwrap();

    assert_eq!(found.as_str(), token('c'));
    assert_eq!(stub.count(Method::Post, LOGIN_PATH), 1);
    assert_eq!(stub.count(Method::Post, LOGOUT_PATH), 1);
    assert_eq!(stub.count(Method::Get, "/demo-inbox"), 0);
}

#[tokio::test]
async fn scoped_no_match_logs_out_once() {
    let stub = Arc::new(StubClient::new());
    stub.on_post(LOGIN_PATH, [HttpResponse::new(200, "{}")]);
    stub.on_get("/inbox", [listing(&[item(11, "Welcome", "")])]);

    let err = correlator(&stub).correlate(&scoped_request()).await.unwrap_err();

    assert!(err.to_string().contains("private inbox of user_k3x9w0"));
    assert_eq!(stub.count(Method::Get, "/inbox"), 3);
    assert_eq!(stub.count(Method::Post, LOGOUT_PATH), 1);
}

#[tokio::test]
async fn scoped_transport_error_logs_out_once() {
    let stub = Arc::new(StubClient::new());
    stub.on_post(LOGIN_PATH, [HttpResponse::new(200, "{}")]);
    stub.fail(Method::Get, "/inbox", "connection reset");

    let err = correlator(&stub).correlate(&scoped_request()).await.unwrap_err();

    match err {
        E2eError::CorrelationNotFound { last_error, .. } => {
            assert!(last_error.unwrap_or_default().contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stub.count(Method::Post, LOGOUT_PATH), 1);
}

#[tokio::test]
async fn scoped_failed_login_still_logs_out_once() {
    let stub = Arc::new(StubClient::new());
    stub.on_post(LOGIN_PATH, [HttpResponse::new(401, r#"{"message":"bad credentials"}"#)]);

    let err = correlator(&stub).correlate(&scoped_request()).await.unwrap_err();

    assert!(matches!(err, E2eError::Authentication { ref status, .. } if status == "401"));
    assert_eq!(stub.count(Method::Get, "/inbox"), 0);
    assert_eq!(stub.count(Method::Post, LOGOUT_PATH), 1);
}
