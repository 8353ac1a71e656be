//! TLS utilities for the networking client.
//!
//! Root store assembly, crypto provider selection and `ClientConfig`
//! construction with a custom server certificate verifier installed.
//! Native root certificates are loaded once and cached, since OS certificate
//! store lookups can be slow on some platforms.

use crate::config::TlsRootConfig;
use crate::error::NetworkError;
use rustls::RootCertStore;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

/// Cached native root certificates.
/// Always stores Ok; empty vec means no certs found (warned, not errored).
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Get cached native root certificates (may be empty).
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Get the crypto provider for TLS connections.
///
/// Uses the process-wide default provider when one is installed, otherwise
/// an aws-lc-rs provider that is not installed globally.
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Assemble the trust anchors for `tls_roots` plus any additional roots.
///
/// # Errors
///
/// Returns `NetworkError::Tls` if the native store yields no usable
/// certificate or an additional root cannot be parsed.
pub fn root_store(
    tls_roots: TlsRootConfig,
    additional: &[CertificateDer<'static>],
) -> Result<RootCertStore, NetworkError> {
    let mut store = match tls_roots {
        TlsRootConfig::WebPki => RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        },
        TlsRootConfig::Native => native_root_store()?,
    };

    for cert in additional {
        store
            .add(cert.clone())
            .map_err(|e| NetworkError::Tls(Box::new(e)))?;
    }

    Ok(store)
}

fn native_root_store() -> Result<RootCertStore, NetworkError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(NetworkError::Tls(
            "no native root CA certificates found in OS certificate store".into(),
        ));
    }

    let mut store = RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(certs.iter().cloned());

    if ignored > 0 {
        tracing::warn!(
            added = added,
            ignored = ignored,
            "some native root certificates could not be parsed"
        );
    }

    if added == 0 {
        return Err(NetworkError::Tls(
            format!(
                "no valid native root CA certificates parsed (found {}, all {} failed to parse)",
                certs.len(),
                ignored
            )
            .into(),
        ));
    }

    Ok(store)
}

/// Standard chain-of-trust verifier over `roots`.
///
/// # Errors
///
/// Returns `NetworkError::Tls` if the root store is empty.
pub fn system_verifier(
    roots: RootCertStore,
    provider: Arc<CryptoProvider>,
) -> Result<Arc<WebPkiServerVerifier>, NetworkError> {
    WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
        .build()
        .map_err(|e| NetworkError::Tls(Box::new(e)))
}

/// Client config that routes every server certificate through `verifier`.
///
/// # Errors
///
/// Returns `NetworkError::Tls` if the provider supports no safe protocol version.
pub fn client_config(
    verifier: Arc<dyn ServerCertVerifier>,
    provider: Arc<CryptoProvider>,
) -> Result<rustls::ClientConfig, NetworkError> {
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| NetworkError::Tls(Box::new(e)))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}
