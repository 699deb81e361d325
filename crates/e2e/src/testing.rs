//! Testing utilities: a scripted [`HttpClient`] with a call log.
//!
//! Each `(method, path)` route holds a queue of scripted outcomes. The queue
//! is consumed front to back and its last entry repeats forever. Unscripted
//! routes answer 404.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{E2eError, E2eResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Method};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

#[derive(Default)]
pub struct StubClient {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, entry: Scripted) {
        self.routes
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(entry);
    }

    /// Append responses for a route
    pub fn on(&self, method: Method, path: &str, responses: impl IntoIterator<Item = HttpResponse>) -> &Self {
        for response in responses {
            self.push(method, path, Scripted::Respond(response));
        }
        self
    }

    pub fn on_get(&self, path: &str, responses: impl IntoIterator<Item = HttpResponse>) -> &Self {
        self.on(Method::Get, path, responses)
    }

    pub fn on_post(&self, path: &str, responses: impl IntoIterator<Item = HttpResponse>) -> &Self {
        self.on(Method::Post, path, responses)
    }

    /// Append a transport failure for a route
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(method, path, Scripted::Fail(message.to_string()));
        self
    }

    /// Every request seen so far, in order
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Paths requested, in order
    pub fn paths(&self) -> Vec<String> {
        self.calls.lock().iter().map(|r| r.path.clone()).collect()
    }
}

#[async_trait]
impl HttpClient for StubClient {
    async fn send(&self, request: HttpRequest) -> E2eResult<HttpResponse> {
        let key = (request.method, request.path.clone());
        self.calls.lock().push(request);

        let next = {
            let mut routes = self.routes.lock();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match next {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(E2eError::Transport(message)),
            None => Ok(HttpResponse::new(404, format!("no stub for {} {}", key.0.as_str(), key.1))),
        }
    }
}
