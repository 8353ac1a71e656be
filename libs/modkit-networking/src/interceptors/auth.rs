use crate::error::NetworkError;
use crate::interceptor::RequestInterceptor;
use crate::request::NetworkRequest;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Source of bearer tokens for [`AuthenticationInterceptor`]
///
/// `Ok(None)` means "no credentials available" and lets the request through
/// unauthenticated. Closures returning a future implement this trait:
///
/// ```ignore
/// let provider = || async { Ok::<_, NetworkError>(Some(load_token().await)) };
/// let auth = AuthenticationInterceptor::new(provider);
/// ```
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// # Errors
    ///
    /// Any error is propagated to the caller unchanged and the request is not sent.
    async fn token(&self) -> Result<Option<String>, NetworkError>;
}

#[async_trait]
impl<F, Fut> TokenProvider for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, NetworkError>> + Send + 'static,
{
    async fn token(&self) -> Result<Option<String>, NetworkError> {
        self().await
    }
}

/// Sets `Authorization: Bearer <token>` on every request
#[derive(Clone)]
pub struct AuthenticationInterceptor {
    provider: Arc<dyn TokenProvider>,
}

impl AuthenticationInterceptor {
    #[must_use]
    pub fn new(provider: impl TokenProvider + 'static) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    #[must_use]
    pub fn from_arc(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RequestInterceptor for AuthenticationInterceptor {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn intercept_request(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        match self.provider.token().await? {
            Some(token) => Ok(request.with_header("Authorization", format!("Bearer {token}"))),
            None => Ok(request),
        }
    }
}
