//! HTTP collaborator
//!
//! The engine only needs GET/POST with headers, query, body and a per-call
//! timeout. [`HttpClient`] is the seam; [`ReqwestClient`] talks to the real
//! service and keeps session cookies, the stub in [`crate::testing`] replays
//! scripted responses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A request relative to the client's base address
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Falls back to the client default when unset
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json")
    }

    pub fn accept_html(self) -> Self {
        self.header("Accept", "text/html")
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = Some(RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Header value by case-insensitive name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: Value) -> Self {
        Self::new(status, body.to_string())
            .with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body as JSON; an empty object when the body is not JSON
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// `message` or `error` field of a JSON body, empty when absent
    pub fn message(&self) -> String {
        let body = self.json();
        match body.get("message").or_else(|| body.get("error")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request. Transport failures are `Err`; any status is `Ok`.
    async fn send(&self, request: HttpRequest) -> E2eResult<HttpResponse>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn send(&self, request: HttpRequest) -> E2eResult<HttpResponse> {
        (**self).send(request).await
    }
}

/// reqwest-backed client with a cookie jar, one per worker
pub struct ReqwestClient {
    base_url: String,
    inner: reqwest::Client,
    default_timeout: Duration,
}

impl ReqwestClient {
    pub fn new(base_url: &str, default_timeout: Duration) -> E2eResult<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(E2eError::InvalidUrl(base_url.to_string()));
        }
        let inner = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            inner,
            default_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> E2eResult<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let url = self.url(&request.path);
        debug!("{} {}", request.method.as_str(), url);

        let mut builder = self
            .inner
            .request(method, &url)
            .timeout(request.timeout.unwrap_or(self.default_timeout));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(pairs)) => builder.form(pairs),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| E2eError::Transport(format!("{} {}: {}", request.method.as_str(), request.path, e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_lowercase(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| E2eError::Transport(format!("reading body of {}: {}", request.path, e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
