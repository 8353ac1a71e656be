//! Test doubles shared by the unit tests.

use crate::error::NetworkError;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::request::{Headers, NetworkRequest};
use crate::response::NetworkResponse;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub const TEST_BASE: &str = "https://api.example.com";

pub fn test_url(path: &str) -> Url {
    Url::parse(&format!("{TEST_BASE}{path}")).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("test error: {0}")]
pub struct TestError(pub &'static str);

/// Transport that answers every request with a canned result
pub struct StubTransport {
    status: u16,
    body: &'static str,
    headers: Headers,
    failure: Option<fn() -> NetworkError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<NetworkRequest>>,
}

impl StubTransport {
    pub fn ok(status: u16, body: &'static str) -> Self {
        Self {
            status,
            body,
            headers: Headers::new(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(failure: fn() -> NetworkError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::ok(200, "")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<NetworkRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<NetworkRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = request.url().clone();
        self.requests.lock().push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure {
            return Err(failure());
        }

        Ok(NetworkResponse::new(
            Bytes::from_static(self.body.as_bytes()),
            self.status,
            self.headers.clone(),
            Some(url),
        ))
    }
}

/// Interceptor that journals every call and appends its label to `x-trace`
pub struct RecordingInterceptor {
    label: &'static str,
    journal: Arc<Mutex<Vec<String>>>,
    originals: Mutex<Vec<NetworkRequest>>,
}

impl RecordingInterceptor {
    pub fn new(label: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            journal: Arc::clone(journal),
            originals: Mutex::new(Vec::new()),
        })
    }

    /// Requests handed to the response side, in call order
    pub fn seen_originals(&self) -> Vec<NetworkRequest> {
        self.originals.lock().clone()
    }

    fn append_trace(&self, existing: Option<&str>) -> String {
        match existing {
            Some(trace) => format!("{trace},{}", self.label),
            None => self.label.to_owned(),
        }
    }
}

#[async_trait]
impl RequestInterceptor for RecordingInterceptor {
    async fn intercept_request(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        self.journal.lock().push(format!("request:{}", self.label));
        let trace = self.append_trace(request.header("x-trace"));
        Ok(request.with_header("x-trace", trace))
    }
}

#[async_trait]
impl ResponseInterceptor for RecordingInterceptor {
    async fn intercept_response(
        &self,
        response: NetworkResponse,
        request: &NetworkRequest,
    ) -> Result<NetworkResponse, NetworkError> {
        self.journal.lock().push(format!("response:{}", self.label));
        self.originals.lock().push(request.clone());
        let trace = self.append_trace(response.header("x-trace"));
        Ok(response.with_header("x-trace", trace))
    }
}

/// Interceptor that always fails with `TestError(message)`
pub struct FailingInterceptor {
    message: &'static str,
}

impl FailingInterceptor {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl RequestInterceptor for FailingInterceptor {
    async fn intercept_request(&self, _request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        Err(NetworkError::interceptor(TestError(self.message)))
    }
}

#[async_trait]
impl ResponseInterceptor for FailingInterceptor {
    async fn intercept_response(
        &self,
        _response: NetworkResponse,
        _request: &NetworkRequest,
    ) -> Result<NetworkResponse, NetworkError> {
        Err(NetworkError::interceptor(TestError(self.message)))
    }
}
