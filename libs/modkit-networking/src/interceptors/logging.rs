use crate::error::NetworkError;
use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
use crate::request::NetworkRequest;
use crate::response::NetworkResponse;
use async_trait::async_trait;
use std::sync::Arc;

/// Sink for request/response log lines
///
/// Implementations must not fail; the pipeline ignores anything they do
/// besides the side effect.
pub trait NetworkLogger: Send + Sync {
    fn log_request(&self, request: &NetworkRequest);

    /// `request` is the request before interception
    fn log_response(&self, response: &NetworkResponse, request: &NetworkRequest);
}

/// Logs through `tracing`: method, URL and status at INFO; headers and
/// UTF-8 bodies at DEBUG.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNetworkLogger;

impl NetworkLogger for TracingNetworkLogger {
    fn log_request(&self, request: &NetworkRequest) {
        tracing::info!(
            method = %request.method(),
            url = %request.url(),
            "outgoing request"
        );
        if !request.headers().is_empty() {
            tracing::debug!(headers = ?request.headers(), "request headers");
        }
        if let Some(body) = request.body().and_then(|b| std::str::from_utf8(b).ok()) {
            tracing::debug!(body = %body, "request body");
        }
    }

    fn log_response(&self, response: &NetworkResponse, request: &NetworkRequest) {
        tracing::info!(
            status = response.status_code(),
            success = response.is_successful(),
            url = %request.url(),
            "response received"
        );
        if !response.headers().is_empty() {
            tracing::debug!(headers = ?response.headers(), "response headers");
        }
        if let Some(body) = response.text() {
            tracing::debug!(body = %body, "response body");
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNetworkLogger;

impl NetworkLogger for NoopNetworkLogger {
    fn log_request(&self, _request: &NetworkRequest) {}

    fn log_response(&self, _response: &NetworkResponse, _request: &NetworkRequest) {}
}

/// Request and response interceptor that forwards both sides to a [`NetworkLogger`]
///
/// Register the same instance on both chains with
/// [`NetworkingClientBuilder::interceptor`](crate::NetworkingClientBuilder::interceptor).
#[derive(Clone)]
pub struct LoggingInterceptor {
    logger: Arc<dyn NetworkLogger>,
}

impl LoggingInterceptor {
    #[must_use]
    pub fn new(logger: Arc<dyn NetworkLogger>) -> Self {
        Self { logger }
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new(Arc::new(TracingNetworkLogger))
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept_request(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        self.logger.log_request(&request);
        Ok(request)
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept_response(
        &self,
        response: NetworkResponse,
        request: &NetworkRequest,
    ) -> Result<NetworkResponse, NetworkError> {
        self.logger.log_response(&response, request);
        Ok(response)
    }
}
