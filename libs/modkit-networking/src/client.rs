use crate::builder::NetworkingClientBuilder;
use crate::config::NetworkingEnvironment;
use crate::error::NetworkError;
use crate::interceptor::InterceptorPipeline;
use crate::pinning::TrustEvaluator;
use crate::request::{Headers, HttpMethod, NetworkRequest};
use crate::response::NetworkResponse;
use crate::transport::Transport;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Typed HTTP client facade
///
/// Every exchange runs the request interceptors in registration order, the
/// transport, a status check and the response interceptors. Non-2xx
/// responses fail with [`NetworkError::HttpStatus`] before any response
/// interceptor runs.
///
/// # Thread Safety
///
/// `NetworkingClient` is `Clone + Send + Sync`. Clones share the transport,
/// the interceptor chains and the trust evaluator; nothing is locked after
/// construction.
///
/// # Example
///
/// ```ignore
/// let environment = NetworkingEnvironment::new(Url::parse("https://api.example.com/v1/")?)
///     .with_certificate_pins("api.example.com", ["r/mIkG3eEpVdm+u/ko/cwxzOMo1bk4TyHIlByibiA5E="]);
///
/// let client = NetworkingClient::builder(environment)
///     .interceptor(Arc::new(LoggingInterceptor::default()))
///     .build()?;
///
/// let user: User = client.get_path("users/123", Headers::new()).await?;
/// ```
#[derive(Clone)]
pub struct NetworkingClient {
    transport: Arc<dyn Transport>,
    pipeline: InterceptorPipeline,
    environment: Arc<NetworkingEnvironment>,
    request_timeout: Duration,
    trust_evaluator: Arc<TrustEvaluator>,
}

impl std::fmt::Debug for NetworkingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkingClient")
            .field("base_url", &self.environment.base_url.as_str())
            .field("pipeline", &self.pipeline)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl NetworkingClient {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        pipeline: InterceptorPipeline,
        environment: NetworkingEnvironment,
        request_timeout: Duration,
        trust_evaluator: Arc<TrustEvaluator>,
    ) -> Self {
        Self {
            transport,
            pipeline,
            environment: Arc::new(environment),
            request_timeout,
            trust_evaluator,
        }
    }

    /// Create a builder for a client talking to `environment`
    #[must_use]
    pub fn builder(environment: NetworkingEnvironment) -> NetworkingClientBuilder {
        NetworkingClientBuilder::new(environment)
    }

    #[must_use]
    pub fn environment(&self) -> &NetworkingEnvironment {
        &self.environment
    }

    #[must_use]
    pub fn pipeline(&self) -> &InterceptorPipeline {
        &self.pipeline
    }

    /// Evaluator consulted by the pinning gate during TLS handshakes
    #[must_use]
    pub fn trust_evaluator(&self) -> &Arc<TrustEvaluator> {
        &self.trust_evaluator
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Run one exchange for `request` as given
    ///
    /// The request keeps its own timeout; the configured client timeout is
    /// applied only to requests built by the typed helpers.
    ///
    /// # Errors
    /// Returns the first failure of the exchange: an interceptor error,
    /// a transport error, or `NetworkError::HttpStatus` for a non-2xx response.
    pub async fn perform(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        self.pipeline.execute(request, self.transport.as_ref()).await
    }

    /// Same as [`perform`](Self::perform), abandoned when `cancel` fires
    ///
    /// # Errors
    /// Returns `NetworkError::Cancelled` if the token fires before the
    /// exchange completes, otherwise as [`perform`](Self::perform).
    pub async fn perform_with_cancellation(
        &self,
        request: NetworkRequest,
        cancel: &CancellationToken,
    ) -> Result<NetworkResponse, NetworkError> {
        self.pipeline
            .execute_cancellable(request, self.transport.as_ref(), cancel)
            .await
    }

    /// GET `url` and decode the JSON response body
    ///
    /// # Errors
    /// As [`perform`](Self::perform), plus `NetworkError::DecodingFailed`
    /// if the body does not decode as `T`.
    pub async fn get<T: DeserializeOwned>(&self, url: Url, headers: Headers) -> Result<T, NetworkError> {
        self.perform(self.request(HttpMethod::Get, url, headers, None))
            .await?
            .decode()
    }

    /// POST `body` to `url` and decode the JSON response body
    ///
    /// `Content-Type: application/json` is added when a body is present and
    /// `headers` has no `Content-Type` entry. The check is on the exact key.
    ///
    /// # Errors
    /// As [`get`](Self::get).
    pub async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<Bytes>,
        headers: Headers,
    ) -> Result<T, NetworkError> {
        self.perform(self.request(HttpMethod::Post, url, headers, body))
            .await?
            .decode()
    }

    /// PUT `body` to `url` and decode the JSON response body
    ///
    /// Content-Type handling is the same as [`post`](Self::post).
    ///
    /// # Errors
    /// As [`get`](Self::get).
    pub async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<Bytes>,
        headers: Headers,
    ) -> Result<T, NetworkError> {
        self.perform(self.request(HttpMethod::Put, url, headers, body))
            .await?
            .decode()
    }

    /// DELETE `url`; the response is returned undecoded
    ///
    /// # Errors
    /// As [`perform`](Self::perform).
    pub async fn delete(&self, url: Url, headers: Headers) -> Result<NetworkResponse, NetworkError> {
        self.perform(self.request(HttpMethod::Delete, url, headers, None))
            .await
    }

    /// [`get`](Self::get) on `path` appended to the environment base URL
    ///
    /// # Errors
    /// `NetworkError::InvalidRequestTarget` if the base URL cannot take path
    /// segments, otherwise as [`get`](Self::get).
    pub async fn get_path<T: DeserializeOwned>(&self, path: &str, headers: Headers) -> Result<T, NetworkError> {
        self.get(self.resolve(path)?, headers).await
    }

    /// [`post`](Self::post) on `path` appended to the environment base URL
    ///
    /// # Errors
    /// As [`get_path`](Self::get_path).
    pub async fn post_path<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Bytes>,
        headers: Headers,
    ) -> Result<T, NetworkError> {
        self.post(self.resolve(path)?, body, headers).await
    }

    /// [`put`](Self::put) on `path` appended to the environment base URL
    ///
    /// # Errors
    /// As [`get_path`](Self::get_path).
    pub async fn put_path<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Bytes>,
        headers: Headers,
    ) -> Result<T, NetworkError> {
        self.put(self.resolve(path)?, body, headers).await
    }

    /// [`delete`](Self::delete) on `path` appended to the environment base URL
    ///
    /// # Errors
    /// As [`get_path`](Self::get_path).
    pub async fn delete_path(&self, path: &str, headers: Headers) -> Result<NetworkResponse, NetworkError> {
        self.delete(self.resolve(path)?, headers).await
    }

    /// POST `body` serialized as JSON and decode the JSON response body
    ///
    /// # Errors
    /// `NetworkError::EncodingFailed` if `body` cannot be serialized,
    /// otherwise as [`post`](Self::post).
    pub async fn post_json<B, T>(&self, url: Url, body: &B, headers: Headers) -> Result<T, NetworkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.post(url, Some(encode_json(body)?), headers).await
    }

    /// PUT `body` serialized as JSON and decode the JSON response body
    ///
    /// # Errors
    /// As [`post_json`](Self::post_json).
    pub async fn put_json<B, T>(&self, url: Url, body: &B, headers: Headers) -> Result<T, NetworkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.put(url, Some(encode_json(body)?), headers).await
    }

    fn request(&self, method: HttpMethod, url: Url, mut headers: Headers, body: Option<Bytes>) -> NetworkRequest {
        // exact-key check; a lowercase "content-type" entry does not count
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE.to_owned(), APPLICATION_JSON.to_owned());
        }
        NetworkRequest::new(url, method, headers, body).with_timeout(self.request_timeout)
    }

    /// Append the components of `path` to the base URL
    fn resolve(&self, path: &str) -> Result<Url, NetworkError> {
        let base = &self.environment.base_url;
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| NetworkError::InvalidRequestTarget {
                url: base.to_string(),
                reason: "base URL cannot have path segments".to_owned(),
            })?
            .pop_if_empty()
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

fn encode_json<B: Serialize + ?Sized>(body: &B) -> Result<Bytes, NetworkError> {
    serde_json::to_vec(body)
        .map(Bytes::from)
        .map_err(NetworkError::EncodingFailed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::NetworkingConfig;
    use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
    use crate::interceptors::{AuthenticationInterceptor, LoggingInterceptor};
    use crate::test_support::{
        FailingInterceptor, RecordingInterceptor, StubTransport, TEST_BASE, TestError, test_url,
    };
    use httpmock::prelude::*;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use serde_json::json;

    const USER_JSON: &str = r#"{"id":123,"name":"a","email":"e","active":true}"#;

    #[derive(Debug, PartialEq, Deserialize)]
    struct User {
        id: u64,
        name: String,
        email: String,
        active: bool,
    }

    fn environment(base: &str) -> NetworkingEnvironment {
        NetworkingEnvironment::new(Url::parse(base).unwrap())
    }

    fn stub_client(transport: &Arc<StubTransport>) -> NetworkingClient {
        NetworkingClient::builder(environment(TEST_BASE))
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[tokio::test]
    async fn test_get_decodes_user() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = stub_client(&transport);

        let user: User = client.get(test_url("/users/123"), Headers::new()).await.unwrap();

        assert_eq!(
            user,
            User {
                id: 123,
                name: "a".to_owned(),
                email: "e".to_owned(),
                active: true,
            }
        );
        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method(), HttpMethod::Get);
        assert_eq!(sent.url().as_str(), "https://api.example.com/users/123");
        assert_eq!(sent.body(), None);
        assert_eq!(sent.header(CONTENT_TYPE), None);
    }

    #[tokio::test]
    async fn test_post_with_body_injects_content_type() {
        let transport = Arc::new(StubTransport::ok(201, USER_JSON));
        let client = stub_client(&transport);

        let _: User = client
            .post(test_url("/users"), Some(Bytes::from(r#"{"name":"a"}"#)), Headers::new())
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.method(), HttpMethod::Post);
        assert_eq!(sent.header(CONTENT_TYPE), Some(APPLICATION_JSON));
        assert_eq!(sent.body().map(Bytes::as_ref), Some(&br#"{"name":"a"}"#[..]));
    }

    #[tokio::test]
    async fn test_put_keeps_caller_content_type() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = stub_client(&transport);

        let _: User = client
            .put(
                test_url("/users/123"),
                Some(Bytes::from("a=1")),
                headers(&[("Content-Type", "application/x-www-form-urlencoded")]),
            )
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.header(CONTENT_TYPE), Some("application/x-www-form-urlencoded"));
        assert_eq!(sent.headers().len(), 1);
    }

    #[tokio::test]
    async fn test_content_type_check_is_case_sensitive() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = stub_client(&transport);

        let _: User = client
            .post(
                test_url("/users"),
                Some(Bytes::from("{}")),
                headers(&[("content-type", "text/plain")]),
            )
            .await
            .unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.header("content-type"), Some("text/plain"));
        assert_eq!(sent.header(CONTENT_TYPE), Some(APPLICATION_JSON));
    }

    #[tokio::test]
    async fn test_post_without_body_has_no_content_type() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = stub_client(&transport);

        let _: User = client.post(test_url("/users"), None, Headers::new()).await.unwrap();

        let sent = transport.last_request().unwrap();
        assert_eq!(sent.header(CONTENT_TYPE), None);
        assert_eq!(sent.body(), None);
    }

    #[tokio::test]
    async fn test_requests_carry_configured_timeout() {
        let transport = Arc::new(StubTransport::ok(200, "{}"));
        let client = NetworkingClient::builder(environment(TEST_BASE))
            .timeout(Duration::from_secs(7))
            .transport(transport.clone())
            .build()
            .unwrap();

        client.delete(test_url("/users/1"), Headers::new()).await.unwrap();

        assert_eq!(
            transport.last_request().unwrap().timeout(),
            Duration::from_secs(7)
        );
    }

    #[tokio::test]
    async fn test_identically_configured_clients_send_identical_requests() {
        let first = Arc::new(StubTransport::ok(200, USER_JSON));
        let second = Arc::new(StubTransport::ok(200, USER_JSON));
        let clients = [stub_client(&first), stub_client(&second)];

        let mut results = Vec::new();
        for client in &clients {
            let user: User = client
                .post(
                    test_url("/users"),
                    Some(Bytes::from("{}")),
                    headers(&[("X-Request", "1")]),
                )
                .await
                .unwrap();
            results.push(user);
        }

        assert_eq!(results[0], results[1]);
        assert_eq!(first.requests(), second.requests());
    }

    #[tokio::test]
    async fn test_identically_configured_clients_return_identical_responses() {
        let first = Arc::new(
            StubTransport::ok(200, USER_JSON).with_header("content-type", "application/json"),
        );
        let second = Arc::new(
            StubTransport::ok(200, USER_JSON).with_header("content-type", "application/json"),
        );
        let request = NetworkRequest::post(test_url("/users"), Some(Bytes::from("{}")))
            .with_header("X-Request", "1");

        let response_a = stub_client(&first).perform(request.clone()).await.unwrap();
        let response_b = stub_client(&second).perform(request).await.unwrap();

        assert_eq!(response_a, response_b);
        assert_eq!(response_a.url(), Some(&test_url("/users")));
        assert_eq!(first.requests(), second.requests());
    }

    #[tokio::test]
    async fn test_not_found_skips_response_interceptors() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingInterceptor::new("R", &journal);
        let transport = Arc::new(StubTransport::ok(404, r#"{"error":"missing"}"#));
        let client = NetworkingClient::builder(environment(TEST_BASE))
            .transport(transport.clone())
            .interceptor(recorder)
            .build()
            .unwrap();

        let err = client
            .get::<User>(test_url("/users/999"), Headers::new())
            .await
            .unwrap_err();

        let status = err.http_status().unwrap();
        assert!(status.is_not_found());
        assert_eq!(status.body.as_ref(), br#"{"error":"missing"}"#);
        assert_eq!(*journal.lock(), ["request:R"]);
    }

    #[tokio::test]
    async fn test_failing_interceptor_reaches_caller_without_transport_call() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = NetworkingClient::builder(environment(TEST_BASE))
            .transport(transport.clone())
            .request_interceptor(Arc::new(FailingInterceptor::new("no session")))
            .build()
            .unwrap();

        let err = client
            .get::<User>(test_url("/users/123"), Headers::new())
            .await
            .unwrap_err();

        let NetworkError::Interceptor(source) = err else {
            panic!("expected interceptor error, got {err:?}");
        };
        assert_eq!(source.downcast_ref::<TestError>(), Some(&TestError("no session")));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_decoding_failure() {
        let transport = Arc::new(StubTransport::ok(200, "not json"));
        let client = stub_client(&transport);

        let err = client
            .get::<User>(test_url("/users/123"), Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::DecodingFailed(_)), "{err:?}");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_returns_raw_response() {
        let transport = Arc::new(StubTransport::ok(204, "").with_header("x-deleted", "1"));
        let client = stub_client(&transport);

        let response = client.delete(test_url("/users/1"), Headers::new()).await.unwrap();

        assert_eq!(response.status_code(), 204);
        assert_eq!(response.header("x-deleted"), Some("1"));
        assert_eq!(transport.last_request().unwrap().method(), HttpMethod::Delete);
    }

    #[tokio::test]
    async fn test_path_helpers_join_base_url() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = NetworkingClient::builder(environment("https://api.example.com/v1/"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let _: User = client.get_path("/users/123/", Headers::new()).await.unwrap();
        let _: User = client
            .post_path("users", Some(Bytes::from("{}")), Headers::new())
            .await
            .unwrap();
        let _: User = client.put_path("users/a b", None, Headers::new()).await.unwrap();
        client.delete_path("users//123", Headers::new()).await.unwrap();

        let urls: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.url().to_string())
            .collect();
        assert_eq!(
            urls,
            [
                "https://api.example.com/v1/users/123",
                "https://api.example.com/v1/users",
                "https://api.example.com/v1/users/a%20b",
                "https://api.example.com/v1/users/123",
            ]
        );
    }

    #[tokio::test]
    async fn test_path_helpers_without_trailing_slash_on_base() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = NetworkingClient::builder(environment("https://api.example.com/v1"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let _: User = client.get_path("users/123", Headers::new()).await.unwrap();

        assert_eq!(
            transport.last_request().unwrap().url().as_str(),
            "https://api.example.com/v1/users/123"
        );
    }

    #[tokio::test]
    async fn test_path_on_cannot_be_a_base_url() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = NetworkingClient::builder(environment("mailto:ops@example.com"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let err = client
            .get_path::<User>("users", Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequestTarget { .. }), "{err:?}");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_post_json_serializes_body() {
        let transport = Arc::new(StubTransport::ok(201, USER_JSON));
        let client = stub_client(&transport);

        let user: User = client
            .post_json(test_url("/users"), &json!({"name": "a"}), Headers::new())
            .await
            .unwrap();

        assert_eq!(user.id, 123);
        let sent = transport.last_request().unwrap();
        assert_eq!(sent.header(CONTENT_TYPE), Some(APPLICATION_JSON));
        assert_eq!(sent.body().map(Bytes::as_ref), Some(&br#"{"name":"a"}"#[..]));
    }

    #[tokio::test]
    async fn test_put_json_encoding_failure() {
        let transport = Arc::new(StubTransport::ok(200, USER_JSON));
        let client = stub_client(&transport);
        let mut body = std::collections::HashMap::new();
        body.insert((1, 2), "tuple keys are not valid JSON object keys");

        let err = client
            .put_json::<_, User>(test_url("/users/1"), &body, Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::EncodingFailed(_)), "{err:?}");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_perform_with_cancellation() {
        let transport = Arc::new(StubTransport::ok(200, "{}").with_delay(Duration::from_secs(30)));
        let client = stub_client(&transport);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = client
            .perform_with_cancellation(NetworkRequest::get(test_url("/slow")), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Cancelled));
    }

    #[test]
    fn test_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<NetworkingClient>();
    }

    #[tokio::test]
    async fn test_end_to_end_over_http() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/users")
                .header("content-type", APPLICATION_JSON)
                .header("authorization", "Bearer secret")
                .json_body(json!({"name": "a"}));
            then.status(201)
                .header("content-type", APPLICATION_JSON)
                .body(USER_JSON);
        });

        let client = NetworkingClient::builder(environment(&server.url("/v1/")))
            .with_config(NetworkingConfig::for_testing())
            .request_interceptor(Arc::new(AuthenticationInterceptor::new(|| async {
                Ok::<_, NetworkError>(Some("secret".to_owned()))
            })) as Arc<dyn RequestInterceptor>)
            .interceptor(Arc::new(LoggingInterceptor::default()))
            .build()
            .unwrap();

        let user: User = client
            .post_path("users", Some(Bytes::from(r#"{"name":"a"}"#)), Headers::new())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(user.name, "a");
    }

    #[tokio::test]
    async fn test_end_to_end_server_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/health");
            then.status(503).header("Retry-After", "5").body("down");
        });

        let response_side: Arc<dyn ResponseInterceptor> =
            Arc::new(FailingInterceptor::new("must not run"));
        let client = NetworkingClient::builder(environment(&server.url("/v1/")))
            .with_config(NetworkingConfig::for_testing())
            .response_interceptor(response_side)
            .build()
            .unwrap();

        let err = client
            .get_path::<serde_json::Value>("health", Headers::new())
            .await
            .unwrap_err();

        let status = err.http_status().unwrap();
        assert!(status.is_server_error());
        assert_eq!(status.headers.get("retry-after").map(String::as_str), Some("5"));
        assert!(!status.headers.contains_key("Retry-After"));
        assert_eq!(status.body.as_ref(), b"down");
    }
}
