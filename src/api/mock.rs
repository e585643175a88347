//! In-memory transport for tests.
//!
//! Responses are queued per `METHOD path`. The last queued response for a
//! route is replayed for every later call; unknown routes answer 404.

use super::error::ApiError;
use super::transport::{ApiRequest, ApiResponse, Method, Transport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Reply {
    Response(ApiResponse),
    TransportFailure(String),
}

#[derive(Default)]
struct State {
    routes: HashMap<String, VecDeque<Reply>>,
    requests: Vec<ApiRequest>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

fn route_key(method: Method, path: &str) -> String {
    format!("{} {}", method.as_str(), path)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        state
            .routes
            .entry(route_key(method, path))
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.respond_raw(method, path, status, &body.to_string());
    }

    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &str) {
        self.push(
            method,
            path,
            Reply::Response(ApiResponse {
                status,
                body: body.to_string(),
            }),
        );
    }

    pub fn fail(&self, method: Method, path: &str, reason: &str) {
        self.push(method, path, Reply::TransportFailure(reason.to_string()));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> Option<ApiRequest> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    /// Requests sent to a route, oldest first.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && request.path == path)
            .collect()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        let reply = match state.routes.get_mut(&route_key(request.method, &request.path)) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::TransportFailure(reason)) => Err(ApiError::Transport(reason)),
            None => Ok(ApiResponse {
                status: 404,
                body: r#"{"message":"no mock route"}"#.to_string(),
            }),
        }
    }
}
