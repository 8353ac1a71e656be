use crate::client::NetworkingClient;
use crate::config::{NetworkingConfig, NetworkingEnvironment, TlsRootConfig, TransportSecurity};
use crate::error::NetworkError;
use crate::interceptor::{InterceptorPipeline, RequestInterceptor, ResponseInterceptor};
use crate::pinning::{CertificateValidationGate, PinningCertVerifier, TrustEvaluator};
use crate::tls;
use crate::transport::{HyperTransport, Transport};
use rustls::client::danger::ServerCertVerifier;
use rustls_pki_types::CertificateDer;
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing a [`NetworkingClient`]
///
/// The trust evaluator is configured eagerly in [`build`](Self::build) from
/// the environment's certificate pins, so a built client never changes its
/// pinning behavior.
pub struct NetworkingClientBuilder {
    environment: NetworkingEnvironment,
    config: NetworkingConfig,
    request_interceptors: Vec<Arc<dyn RequestInterceptor>>,
    response_interceptors: Vec<Arc<dyn ResponseInterceptor>>,
    transport: Option<Arc<dyn Transport>>,
}

impl NetworkingClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new(environment: NetworkingEnvironment) -> Self {
        Self {
            environment,
            config: NetworkingConfig::default(),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            transport: None,
        }
    }

    /// Replace the whole configuration
    #[must_use]
    pub fn with_config(mut self, config: NetworkingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the timeout attached to every request the client builds
    ///
    /// Covers sending the request and reading the whole response body.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the default user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable certificate pinning
    ///
    /// When disabled, configured pins are ignored and every handshake uses
    /// standard system trust evaluation.
    #[must_use]
    pub fn certificate_pinning(mut self, enabled: bool) -> Self {
        self.config.certificate_pinning_enabled = enabled;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport_security(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport_security(TransportSecurity::AllowInsecureHttp)`.
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_networking::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Set the TLS root certificate strategy
    #[must_use]
    pub fn tls_roots(mut self, tls_roots: TlsRootConfig) -> Self {
        self.config.tls_roots = tls_roots;
        self
    }

    /// Trust an additional root certificate (DER encoded)
    #[must_use]
    pub fn add_root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.config.additional_root_certificates.push(certificate);
        self
    }

    /// Set the maximum number of redirects to follow
    ///
    /// Set to `0` to disable redirect following (3xx responses pass through as-is).
    /// Default: 10
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    /// Set the idle connection timeout for the connection pool
    ///
    /// Set to `None` to keep idle connections indefinitely.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    ///
    /// Setting to `0` disables connection reuse entirely.
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Append a request interceptor; insertion order is execution order
    #[must_use]
    pub fn request_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.request_interceptors.push(interceptor);
        self
    }

    /// Append a response interceptor; insertion order is execution order
    #[must_use]
    pub fn response_interceptor(mut self, interceptor: Arc<dyn ResponseInterceptor>) -> Self {
        self.response_interceptors.push(interceptor);
        self
    }

    /// Append the same instance to both chains
    #[must_use]
    pub fn interceptor<I>(self, interceptor: Arc<I>) -> Self
    where
        I: RequestInterceptor + ResponseInterceptor + 'static,
    {
        let request_side: Arc<dyn RequestInterceptor> = interceptor.clone();
        let response_side: Arc<dyn ResponseInterceptor> = interceptor;
        self.request_interceptor(request_side)
            .response_interceptor(response_side)
    }

    /// Use `transport` instead of the built-in hyper transport
    ///
    /// TLS settings and the pinning gate have no effect on an injected
    /// transport; the trust evaluator is still built and exposed.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// Returns `NetworkError::Tls` if the root store or TLS configuration
    /// cannot be built, or `NetworkError::InvalidRequest` if the user agent
    /// is not a valid header value.
    pub fn build(self) -> Result<NetworkingClient, NetworkError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }
        if self.environment.allows_insecure_connections {
            tracing::warn!(
                base_url = %self.environment.base_url,
                "environment allows insecure connections; certificate pin mismatches will not be enforced"
            );
        }
        if !self.config.certificate_pinning_enabled {
            tracing::debug!("certificate pinning disabled; using system trust evaluation only");
        }

        let provider = tls::get_crypto_provider();
        let roots = tls::root_store(
            self.config.tls_roots,
            &self.config.additional_root_certificates,
        )?;
        let system_verifier: Arc<dyn ServerCertVerifier> =
            tls::system_verifier(roots.clone(), Arc::clone(&provider))?;

        let pinning = self.environment.pinning_configuration();
        tracing::debug!(
            pinned_hosts = pinning.pinned_hosts().count(),
            enforce = pinning.enforce_validation(),
            "configured certificate pinning"
        );
        let evaluator = Arc::new(TrustEvaluator::with_trust_anchors(
            pinning,
            Arc::clone(&system_verifier),
            &roots,
            &provider,
        ));

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let gate = CertificateValidationGate::new(
                    Arc::clone(&evaluator),
                    self.config.certificate_pinning_enabled,
                );
                let verifier = Arc::new(PinningCertVerifier::new(gate, system_verifier));
                let tls_config = tls::client_config(verifier, provider)?;
                Arc::new(HyperTransport::new(&self.config, tls_config)?)
            }
        };

        Ok(NetworkingClient::new(
            transport,
            InterceptorPipeline::new(self.request_interceptors, self.response_interceptors),
            self.environment,
            self.config.request_timeout,
            evaluator,
        ))
    }
}
