use crate::error::NetworkError;
use crate::interceptor::RequestInterceptor;
use crate::request::NetworkRequest;
use async_trait::async_trait;
use http::HeaderValue;

/// Request interceptor that sets the User-Agent header
///
/// Unlike the transport default, this replaces a `User-Agent` value the
/// caller already put on the request.
#[derive(Debug, Clone)]
pub struct UserAgentInterceptor {
    user_agent: String,
}

impl UserAgentInterceptor {
    /// Create a new `UserAgentInterceptor` with the specified user agent string
    ///
    /// # Errors
    /// Returns `NetworkError::InvalidRequest` if the user agent string is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, NetworkError> {
        let user_agent = user_agent.as_ref();
        HeaderValue::from_str(user_agent).map_err(|e| {
            NetworkError::InvalidRequest(format!("invalid user agent '{user_agent}': {e}"))
        })?;
        Ok(Self {
            user_agent: user_agent.to_owned(),
        })
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl RequestInterceptor for UserAgentInterceptor {
    fn name(&self) -> &'static str {
        "user-agent"
    }

    async fn intercept_request(&self, request: NetworkRequest) -> Result<NetworkRequest, NetworkError> {
        Ok(request.with_header("User-Agent", self.user_agent.clone()))
    }
}
