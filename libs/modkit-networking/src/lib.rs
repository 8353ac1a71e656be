#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Typed HTTP client for `ModKit` with an interceptor pipeline and
//! certificate pinning
//!
//! This crate provides a hyper-based client with:
//! - Ordered request and response interceptor chains
//! - Typed JSON helpers (`get`, `post`, `put`, `delete` and path-relative variants)
//! - Status classification: any non-2xx response becomes [`NetworkError::HttpStatus`]
//! - SPKI certificate pinning enforced inside the TLS handshake
//! - Automatic TLS via rustls (HTTPS only by default)
//! - Connection pooling, redirect following and transparent decompression
//!
//! # Exchange
//!
//! ```text
//! request → request interceptors → transport → status check → response interceptors → caller
//! ```
//!
//! Response interceptors receive the request as the caller built it, before
//! any request interceptor ran. The first failing step ends the exchange and
//! its error reaches the caller unchanged. Nothing is retried.
//!
//! # Certificate Pinning
//!
//! Pins are configured per host on the [`NetworkingEnvironment`]. During every
//! TLS handshake the [`CertificateValidationGate`](pinning::CertificateValidationGate)
//! asks the [`TrustEvaluator`](pinning::TrustEvaluator) about the presented
//! chain. Unpinned hosts get standard system trust evaluation; a pinned host
//! whose chain matches none of its pins fails the handshake with
//! [`NetworkError::CertificatePinningFailed`] unless the environment allows
//! insecure connections.
//!
//! # Example
//!
//! ```ignore
//! use modkit_networking::{Headers, LoggingInterceptor, NetworkingClient, NetworkingEnvironment};
//! use std::sync::Arc;
//! use url::Url;
//!
//! let environment = NetworkingEnvironment::new(Url::parse("https://api.example.com/v1/")?)
//!     .with_certificate_pins("api.example.com", ["r/mIkG3eEpVdm+u/ko/cwxzOMo1bk4TyHIlByibiA5E="]);
//!
//! let client = NetworkingClient::builder(environment)
//!     .interceptor(Arc::new(LoggingInterceptor::default()))
//!     .build()?;
//!
//! let user: User = client.get_path("users/123", Headers::new()).await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod interceptor;
mod interceptors;
pub mod pinning;
mod request;
mod response;
pub mod tls;
mod transport;

#[cfg(test)]
mod test_support;

pub use builder::NetworkingClientBuilder;
pub use client::NetworkingClient;
pub use config::{
    DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, NetworkingConfig, NetworkingEnvironment,
    PinningConfiguration, TlsRootConfig, TransportSecurity,
};
pub use error::{BoxError, HttpStatusError, NetworkError, PinningRejected};
pub use interceptor::{InterceptorPipeline, RequestInterceptor, ResponseInterceptor};
pub use interceptors::{
    AuthenticationInterceptor, LoggingInterceptor, NetworkLogger, NoopNetworkLogger,
    TokenProvider, TracingNetworkLogger, UserAgentInterceptor,
};
pub use request::{DEFAULT_REQUEST_TIMEOUT, Headers, HttpMethod, NetworkRequest};
pub use response::NetworkResponse;
pub use transport::{HyperTransport, Transport};
