use crate::config::{NetworkingConfig, TransportSecurity};
use crate::error::{BoxError, NetworkError, PinningRejected};
use crate::request::{Headers, NetworkRequest};
use crate::response::NetworkResponse;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::error::Error as StdError;
use std::time::Duration;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::policy::{FilterCredentials, Limited, PolicyExt};
use tower_http::follow_redirect::{FollowRedirectLayer, RequestUri};
use url::Url;

/// Boxed response body after decompression
type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

type HttpService = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, BoxError>;

/// HTTP transport seam
///
/// Executes exactly one request and returns the response for ANY status code.
/// Fails only with transport-level kinds: `Timeout`, `Cancelled`, `Connection`,
/// `CertificatePinningFailed`, `InvalidRequestTarget` or `InvalidRequest`.
/// Status classification happens in the pipeline, right after this call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError>;
}

/// Transport over a pooled hyper client with rustls
///
/// Responses are transparently decompressed (gzip, brotli, deflate) and
/// redirects are followed up to the configured limit, with credentials
/// stripped on cross-origin hops.
#[derive(Clone)]
pub struct HyperTransport {
    service: HttpService,
    transport_security: TransportSecurity,
    user_agent: HeaderValue,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("transport_security", &self.transport_security)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Build a transport that performs TLS with `tls_config`
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::InvalidRequest` if the configured User-Agent is
    /// not a valid header value.
    pub fn new(config: &NetworkingConfig, tls_config: rustls::ClientConfig) -> Result<Self, NetworkError> {
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            NetworkError::InvalidRequest(format!("invalid user agent '{}': {e}", config.user_agent))
        })?;

        let builder = hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls_config);
        let https = match config.transport {
            TransportSecurity::AllowInsecureHttp => builder.https_or_http().enable_all_versions().build(),
            TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
        };

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let redirect_policy =
            Limited::new(config.max_redirects).and::<_, (), ()>(FilterCredentials::new());

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(redirect_policy))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(Into::<BoxError>::into);

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            transport_security: config.transport,
            user_agent,
        })
    }

    fn to_http_request(&self, request: NetworkRequest) -> Result<Request<Full<Bytes>>, NetworkError> {
        let (url, method, headers, body, _) = request.into_parts();
        let uri = self.validate_url(&url)?;

        let mut builder = Request::builder().method(http::Method::from(method)).uri(uri);
        let Some(header_map) = builder.headers_mut() else {
            return Err(NetworkError::InvalidRequest("request builder rejected method or URI".to_owned()));
        };

        for (name, value) in &headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                NetworkError::InvalidRequest(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                NetworkError::InvalidRequest(format!("invalid value for header '{name}': {e}"))
            })?;
            header_map.append(header_name, header_value);
        }
        if !header_map.contains_key(USER_AGENT) {
            header_map.insert(USER_AGENT, self.user_agent.clone());
        }

        builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))
    }

    /// Check the address against the transport security mode
    fn validate_url(&self, url: &Url) -> Result<http::Uri, NetworkError> {
        let invalid = |reason: String| NetworkError::InvalidRequestTarget {
            url: url.to_string(),
            reason,
        };

        match url.scheme() {
            "https" => {}
            "http" => {
                if self.transport_security == TransportSecurity::TlsOnly {
                    return Err(invalid(
                        "HTTPS required (transport security is TlsOnly)".to_owned(),
                    ));
                }
            }
            other => {
                return Err(invalid(format!(
                    "unsupported scheme '{other}', only http:// and https:// are supported"
                )));
            }
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host/authority".to_owned()));
        }

        url.as_str()
            .parse::<http::Uri>()
            .map_err(|e| invalid(e.to_string()))
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        let timeout = request.timeout();
        let request_url = request.url().clone();
        let http_request = self.to_http_request(request)?;

        let exchange = async {
            let response = self.service.clone().oneshot(http_request).await?;
            let final_url = response
                .extensions()
                .get::<RequestUri>()
                .and_then(|uri| Url::parse(&uri.0.to_string()).ok());
            let (parts, body) = response.into_parts();
            let data = body.collect().await?.to_bytes();
            Ok::<_, BoxError>((parts, data, final_url))
        };

        let (parts, data, final_url) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => return Err(classify_transport_error(e)),
            Err(_) => return Err(NetworkError::Timeout(timeout)),
        };

        Ok(NetworkResponse::new(
            data,
            parts.status.as_u16(),
            collect_headers(&parts.headers),
            Some(final_url.unwrap_or(request_url)),
        ))
    }
}

/// Box the decompression body so the service type can be erased
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

/// Lowercase header names; repeated headers joined with ", "
fn collect_headers(headers: &http::HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        out.entry(name.as_str().to_owned())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}

/// Map a failed exchange to a transport-level `NetworkError`
///
/// A pinning rejection raised inside the TLS handshake becomes
/// `CertificatePinningFailed`; everything else is a `Connection` error with
/// the cause preserved.
fn classify_transport_error(err: BoxError) -> NetworkError {
    if let Some(host) = find_pinning_rejection(err.as_ref()) {
        return NetworkError::CertificatePinningFailed { host };
    }
    NetworkError::Connection(err)
}

fn find_pinning_rejection(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(rejected) = e.downcast_ref::<PinningRejected>() {
            return Some(rejected.host.clone());
        }
        if let Some(rustls::Error::InvalidCertificate(rustls::CertificateError::Other(other))) =
            e.downcast_ref::<rustls::Error>()
            && let Some(rejected) = other.0.downcast_ref::<PinningRejected>()
        {
            return Some(rejected.host.clone());
        }
        // io::Error::source skips the wrapped error itself
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && let Some(inner) = io.get_ref()
            && let Some(host) = find_pinning_rejection(inner)
        {
            return Some(host);
        }
        current = e.source();
    }
    None
}
