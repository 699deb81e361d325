//! Auth endpoints used by provisioning and identity-scoped mailbox reads

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use storefront_common::{Credentials, TestIdentity};
use tracing::debug;

use crate::error::E2eResult;
use crate::http::{HttpClient, HttpRequest, HttpResponse};

pub const REGISTER_PATH: &str = "/api/auth/register";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
pub const FORGOT_PASSWORD_PATH: &str = "/api/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/api/auth/reset-password";
pub const ME_PATH: &str = "/api/users/me";

#[derive(Clone)]
pub struct AuthApi {
    client: Arc<dyn HttpClient>,
    timeout: Option<Duration>,
}

impl AuthApi {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        match self.timeout {
            Some(t) => request.accept_json().timeout(t),
            None => request.accept_json(),
        }
    }

    pub async fn register(&self, identity: &TestIdentity) -> E2eResult<HttpResponse> {
        let request = self.request(HttpRequest::post(REGISTER_PATH)).json(json!({
            "username": identity.username,
            "email": identity.email,
            "password": identity.password,
            "confirmPassword": identity.password,
        }));
        self.client.send(request).await
    }

    pub async fn login(&self, credentials: &Credentials) -> E2eResult<HttpResponse> {
        let request = self.request(HttpRequest::post(LOGIN_PATH)).json(json!({
            "username": credentials.username,
            "password": credentials.password,
        }));
        self.client.send(request).await
    }

    pub async fn logout(&self) -> E2eResult<HttpResponse> {
        self.client
            .send(self.request(HttpRequest::post(LOGOUT_PATH)))
            .await
    }

    /// Logout whose outcome does not matter
    pub async fn logout_quietly(&self) {
        if let Err(e) = self.logout().await {
            debug!("Ignoring logout failure: {}", e);
        }
    }

    pub async fn forgot_password(&self, email: &str) -> E2eResult<HttpResponse> {
        let request = self
            .request(HttpRequest::post(FORGOT_PASSWORD_PATH))
            .json(json!({ "email": email }));
        self.client.send(request).await
    }

    pub async fn validate_reset_token(&self, token: &str) -> E2eResult<HttpResponse> {
        let path = format!("{}/{}", RESET_PASSWORD_PATH, token);
        self.client.send(self.request(HttpRequest::get(path))).await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> E2eResult<HttpResponse> {
        let path = format!("{}/{}", RESET_PASSWORD_PATH, token);
        let request = self.request(HttpRequest::post(path)).json(json!({
            "password": password,
            "confirmPassword": password,
        }));
        self.client.send(request).await
    }

    pub async fn me(&self) -> E2eResult<HttpResponse> {
        self.client.send(self.request(HttpRequest::get(ME_PATH))).await
    }
}
