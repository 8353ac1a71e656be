use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Header map carried by requests and responses.
///
/// Keys are stored exactly as given; lookups are case-sensitive. Headers
/// received from the network, including [`HttpStatusError::headers`], have
/// lowercase names, so look them up as `"content-type"` rather than
/// `"Content-Type"`.
///
/// [`HttpStatusError::headers`]: crate::HttpStatusError::headers
pub type Headers = BTreeMap<String, String>;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP verb of a [`NetworkRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    /// Every supported verb
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
        HttpMethod::Patch,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    /// Uppercase wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

/// Immutable description of an outgoing HTTP request
///
/// Constructing a request never fails: address and header validation happen
/// when the transport puts the request on the wire. Modifiers consume the
/// value and return an updated copy, which is how request interceptors
/// transform it.
///
/// An absent body (`None`) is distinct from an empty body (`Some(empty)`).
///
/// # Example
///
/// ```ignore
/// use modkit_networking::{HttpMethod, NetworkRequest};
///
/// let request = NetworkRequest::get(url)
///     .with_header("x-request-id", "abc123")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(request.method(), HttpMethod::Get);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    url: Url,
    method: HttpMethod,
    headers: Headers,
    body: Option<Bytes>,
    timeout: Duration,
}

impl NetworkRequest {
    /// Create a request with the default timeout
    #[must_use]
    pub fn new(url: Url, method: HttpMethod, headers: Headers, body: Option<Bytes>) -> Self {
        Self {
            url,
            method,
            headers,
            body,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(url, HttpMethod::Get, Headers::new(), None)
    }

    #[must_use]
    pub fn post(url: Url, body: Option<Bytes>) -> Self {
        Self::new(url, HttpMethod::Post, Headers::new(), body)
    }

    #[must_use]
    pub fn put(url: Url, body: Option<Bytes>) -> Self {
        Self::new(url, HttpMethod::Put, Headers::new(), body)
    }

    #[must_use]
    pub fn delete(url: Url) -> Self {
        Self::new(url, HttpMethod::Delete, Headers::new(), None)
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
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

    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Set a header, replacing any value stored under the same key
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merge headers, later values winning on key collisions
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

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Consume the request into its parts
    #[must_use]
    pub fn into_parts(self) -> (Url, HttpMethod, Headers, Option<Bytes>, Duration) {
        (self.url, self.method, self.headers, self.body, self.timeout)
    }
}
