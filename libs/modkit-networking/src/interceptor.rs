use crate::error::NetworkError;
use crate::request::NetworkRequest;
use crate::response::NetworkResponse;
use crate::transport::Transport;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Transforms an outgoing request before it reaches the transport
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Returns the name of this interceptor (for debugging/logging)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Return the request to pass to the next step, or fail the exchange
    async fn intercept_request(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError>;
}

/// Transforms a successful response before it reaches the caller
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Returns the name of this interceptor (for debugging/logging)
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// `request` is the request as the caller built it, before any request
    /// interceptor ran.
    async fn intercept_response(
        &self,
        response: NetworkResponse,
        request: &NetworkRequest,
    ) -> Result<NetworkResponse, NetworkError>;
}

/// Ordered request and response interceptor chains around one transport call
///
/// Insertion order is execution order. The chains are fixed at construction
/// and shared cheaply between clones.
#[derive(Clone, Default)]
pub struct InterceptorPipeline {
    request_interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
    response_interceptors: Arc<[Arc<dyn ResponseInterceptor>]>,
}

impl fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field(
                "request_interceptors",
                &self.request_interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field(
                "response_interceptors",
                &self.response_interceptors.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl InterceptorPipeline {
    #[must_use]
    pub fn new(
        request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
        response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    ) -> Self {
        Self {
            request_interceptors: request_interceptors.into(),
            response_interceptors: response_interceptors.into(),
        }
    }

    #[must_use]
    pub fn request_interceptors(&self) -> &[Arc<dyn RequestInterceptor>] {
        &self.request_interceptors
    }

    #[must_use]
    pub fn response_interceptors(&self) -> &[Arc<dyn ResponseInterceptor>] {
        &self.response_interceptors
    }

    /// Run the request chain, index 0 first, each step seeing the previous output
    ///
    /// # Errors
    ///
    /// Returns the first interceptor error unchanged; later steps do not run.
    pub async fn run_request_chain(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        let mut current = request;
        for interceptor in self.request_interceptors.iter() {
            current = interceptor.intercept_request(current).await.inspect_err(|e| {
                tracing::debug!(interceptor = interceptor.name(), error = %e, "request interceptor failed");
            })?;
        }
        Ok(current)
    }

    /// Run the response chain, index 0 first
    ///
    /// Every step receives `original`, the request before interception.
    ///
    /// # Errors
    ///
    /// Returns the first interceptor error unchanged; later steps do not run.
    pub async fn run_response_chain(
        &self,
        response: NetworkResponse,
        original: &NetworkRequest,
    ) -> Result<NetworkResponse, NetworkError> {
        let mut current = response;
        for interceptor in self.response_interceptors.iter() {
            current = interceptor
                .intercept_response(current, original)
                .await
                .inspect_err(|e| {
                    tracing::debug!(interceptor = interceptor.name(), error = %e, "response interceptor failed");
                })?;
        }
        Ok(current)
    }

    /// Request chain, transport call, status check, response chain
    ///
    /// A non-2xx response becomes `NetworkError::HttpStatus` and skips the
    /// response chain.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any stage; nothing is retried.
    pub async fn execute(
        &self,
        request: NetworkRequest,
        transport: &dyn Transport,
    ) -> Result<NetworkResponse, NetworkError> {
        let original = request.clone();
        let intercepted = self.run_request_chain(request).await?;

        let response = transport.execute(intercepted).await?;
        let response = response.error_for_status().inspect_err(|e| {
            tracing::debug!(error = %e, "non-success status, skipping response interceptors");
        })?;

        self.run_response_chain(response, &original).await
    }

    /// Same as [`execute`](Self::execute), abandoned when `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Cancelled` if the token fires first; the
    /// in-flight exchange is dropped.
    pub async fn execute_cancellable(
        &self,
        request: NetworkRequest,
        transport: &dyn Transport,
        cancel: &CancellationToken,
    ) -> Result<NetworkResponse, NetworkError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(NetworkError::Cancelled),
            result = self.execute(request, transport) => result,
        }
    }
}
