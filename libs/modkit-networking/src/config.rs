use rustls_pki_types::CertificateDer;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

use crate::request::DEFAULT_REQUEST_TIMEOUT;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-networking/", env!("CARGO_PKG_VERSION"));

/// Default maximum number of redirects followed by the transport
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Networking client configuration
#[derive(Debug, Clone)]
pub struct NetworkingConfig {
    /// Timeout attached to every request built by the client (default: 60 seconds)
    pub request_timeout: Duration,

    /// User-Agent applied by the transport when a request carries none
    /// (default: `modkit-networking/<version>`)
    pub user_agent: String,

    /// Consult the pinning gate during TLS handshakes (default: true)
    ///
    /// When `false` every handshake goes through standard system trust
    /// evaluation and configured pins are ignored.
    pub certificate_pinning_enabled: bool,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Extra trust anchors appended to the root store (DER encoded)
    ///
    /// Used for private CAs and for test servers with generated certificates.
    pub additional_root_certificates: Vec<CertificateDer<'static>>,

    /// Maximum number of redirects to follow (default: 10, `0` disables)
    pub max_redirects: usize,

    /// Timeout for idle pooled connections (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            certificate_pinning_enabled: true,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            additional_root_certificates: Vec::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl NetworkingConfig {
    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

/// Deployment environment a client talks to
///
/// Deserializable so hosts can load it from their own configuration files:
///
/// ```yaml
/// base_url: https://api.example.com/v1/
/// certificate_pins:
///   api.example.com:
///     - "r/mIkG3eEpVdm+u/ko/cwxzOMo1bk4TyHIlByibiA5E="
/// allows_insecure_connections: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkingEnvironment {
    /// Base address that path-based verbs are resolved against
    pub base_url: Url,

    /// Hostname to base64 SPKI SHA-256 pins
    #[serde(default)]
    pub certificate_pins: HashMap<String, Vec<String>>,

    /// When `true`, pin mismatches are logged but do not block the connection
    #[serde(default)]
    pub allows_insecure_connections: bool,
}

impl NetworkingEnvironment {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            certificate_pins: HashMap::new(),
            allows_insecure_connections: false,
        }
    }

    /// Add pins for `host`, appending to any already configured
    #[must_use]
    pub fn with_certificate_pins<I, S>(mut self, host: impl Into<String>, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.certificate_pins
            .entry(host.into())
            .or_default()
            .extend(pins.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_insecure_connections(mut self, allow: bool) -> Self {
        self.allows_insecure_connections = allow;
        self
    }

    /// Pinning configuration derived from this environment
    ///
    /// Enforcement is the inverse of `allows_insecure_connections`.
    #[must_use]
    pub fn pinning_configuration(&self) -> PinningConfiguration {
        PinningConfiguration::new(
            self.certificate_pins
                .iter()
                .map(|(host, pins)| (host.as_str(), pins.iter().map(String::as_str))),
            !self.allows_insecure_connections,
        )
    }
}

/// Normalized pinned-domain configuration consumed by the trust evaluator
///
/// Hostnames are matched exactly, ignoring ASCII case and a trailing root dot.
/// Subdomains of a pinned host are not covered. A host configured with an
/// empty pin list is treated as not pinned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinningConfiguration {
    pins: BTreeMap<String, Vec<String>>,
    enforce_validation: bool,
}

impl PinningConfiguration {
    /// Build a configuration; pins are de-duplicated, first occurrence wins
    pub fn new<I, H, P, S>(pins: I, enforce_validation: bool) -> Self
    where
        I: IntoIterator<Item = (H, P)>,
        H: AsRef<str>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut normalized: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (host, host_pins) in pins {
            let entry = normalized.entry(normalize_host(host.as_ref())).or_default();
            for pin in host_pins {
                let pin = pin.into();
                if !entry.contains(&pin) {
                    entry.push(pin);
                }
            }
        }
        normalized.retain(|_, pins| !pins.is_empty());

        Self {
            pins: normalized,
            enforce_validation,
        }
    }

    /// Configuration with no pinned hosts
    #[must_use]
    pub fn empty(enforce_validation: bool) -> Self {
        Self {
            pins: BTreeMap::new(),
            enforce_validation,
        }
    }

    /// Pins configured for `host`, `None` if the host is not pinned
    #[must_use]
    pub fn pins_for(&self, host: &str) -> Option<&[String]> {
        self.pins.get(&normalize_host(host)).map(Vec::as_slice)
    }

    #[must_use]
    pub fn is_pinned(&self, host: &str) -> bool {
        self.pins_for(host).is_some()
    }

    #[must_use]
    pub fn enforce_validation(&self) -> bool {
        self.enforce_validation
    }

    /// Normalized pinned hostnames in sorted order
    pub fn pinned_hosts(&self) -> impl Iterator<Item = &str> {
        self.pins.keys().map(String::as_str)
    }
}

fn normalize_host(host: &str) -> String {
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}
