use crate::error::{HttpStatusError, NetworkError};
use crate::request::Headers;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::Url;

/// Immutable description of a completed HTTP exchange
///
/// The payload is always present (possibly empty). Header names produced by
/// [`HyperTransport`](crate::HyperTransport) are lowercase; repeated headers
/// are joined with `", "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    data: Bytes,
    status_code: u16,
    headers: Headers,
    url: Option<Url>,
}

impl NetworkResponse {
    #[must_use]
    pub fn new(data: Bytes, status_code: u16, headers: Headers, url: Option<Url>) -> Self {
        Self {
            data,
            status_code,
            headers,
            url,
        }
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Header value stored under exactly `name`
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Final address of the exchange, after redirects
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Status in `200..=299`
    #[must_use]
    pub fn is_successful(&self) -> bool {
        (200..=299).contains(&self.status_code)
    }

    /// Status in `400..=499`
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..=499).contains(&self.status_code)
    }

    /// Status in `500..=599`
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status_code)
    }

    /// Decode the payload as JSON into `T`
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::DecodingFailed` if the payload does not parse as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        serde_json::from_slice(&self.data).map_err(NetworkError::DecodingFailed)
    }

    /// Payload as UTF-8 text, `None` if it is not valid UTF-8
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Payload as a JSON value, `None` if it is not valid JSON
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.data).ok()
    }

    /// Turn a non-2xx response into `NetworkError::HttpStatus`
    ///
    /// The error keeps the full body and headers.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::HttpStatus` if the status is outside `200..=299`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let response = transport.execute(request).await?.error_for_status()?;
    /// ```
    pub fn error_for_status(self) -> Result<Self, NetworkError> {
        if self.is_successful() {
            return Ok(self);
        }
        Err(NetworkError::HttpStatus(HttpStatusError {
            status: self.status_code,
            body: self.data,
            headers: self.headers,
        }))
    }

    #[must_use]
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Consume the response, returning its payload
    #[must_use]
    pub fn into_data(self) -> Bytes {
        self.data
    }
}
