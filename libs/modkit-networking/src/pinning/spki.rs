use super::{PinValidation, PinValidator, ServerTrust};
use crate::config::PinningConfiguration;
use crate::tls;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rustls::RootCertStore;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::{CertificateDer, DnsName, ServerName, TrustAnchor};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use x509_parser::error::X509Error;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Pin of a certificate: base64 of SHA-256 over its DER `SubjectPublicKeyInfo`
///
/// # Errors
///
/// Returns the parser error if `cert` is not a well-formed X.509 certificate.
pub fn spki_pin(cert: &CertificateDer<'_>) -> Result<String, X509Error> {
    let (_, parsed) = X509Certificate::from_der(cert.as_ref()).map_err(|e| match e {
        x509_parser::nom::Err::Error(e) | x509_parser::nom::Err::Failure(e) => e,
        x509_parser::nom::Err::Incomplete(_) => X509Error::InvalidCertificate,
    })?;
    let digest = Sha256::digest(parsed.public_key().raw);
    Ok(STANDARD.encode(digest))
}

/// Pin of a trust anchor, comparable with [`spki_pin`] of its certificate
///
/// Trust anchors keep only the contents of their `SubjectPublicKeyInfo`, so
/// the outer DER `SEQUENCE` header is restored before hashing.
#[must_use]
pub fn trust_anchor_pin(anchor: &TrustAnchor<'_>) -> String {
    let spki = der_sequence(anchor.subject_public_key_info.as_ref());
    STANDARD.encode(Sha256::digest(spki))
}

fn der_sequence(contents: &[u8]) -> Vec<u8> {
    let len = contents.len();
    let mut out = Vec::with_capacity(len + 10);
    out.push(0x30);
    match u8::try_from(len) {
        Ok(short) if short < 0x80 => out.push(short),
        _ => {
            let bytes = len.to_be_bytes();
            let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
            let significant = &bytes[leading_zeros..];
            out.push(0x80 | u8::try_from(significant.len()).unwrap_or(0x7f));
            out.extend_from_slice(significant);
        }
    }
    out.extend_from_slice(contents);
    out
}

/// Root whose key is pinned by at least one host
#[derive(Debug)]
struct PinnedAnchor {
    pin: String,
    /// Accepts only chains that terminate at this root
    verifier: Arc<WebPkiServerVerifier>,
}

/// Pin validator backed by SPKI SHA-256 pins
///
/// A pinned host's chain must first pass standard chain-of-trust validation
/// with `system_verifier`; only then are the pins compared. Any presented
/// certificate (leaf or intermediate) may carry the matching key, and so may
/// the trust anchor the chain was validated against once it is registered
/// with [`with_trust_anchors`](Self::with_trust_anchors).
#[derive(Debug)]
pub struct SpkiPinValidator {
    config: PinningConfiguration,
    system_verifier: Arc<dyn ServerCertVerifier>,
    pinned_anchors: Vec<PinnedAnchor>,
}

impl SpkiPinValidator {
    #[must_use]
    pub fn new(config: PinningConfiguration, system_verifier: Arc<dyn ServerCertVerifier>) -> Self {
        Self {
            config,
            system_verifier,
            pinned_anchors: Vec::new(),
        }
    }

    /// Lets pins match the root a chain is anchored in
    ///
    /// Servers rarely send their root certificate, so a pinned root is looked
    /// up in `roots`. Only roots whose key appears among the configured pins
    /// are kept.
    #[must_use]
    pub fn with_trust_anchors(
        mut self,
        roots: &RootCertStore,
        provider: &Arc<CryptoProvider>,
    ) -> Self {
        let configured: HashSet<&str> = self
            .config
            .pinned_hosts()
            .filter_map(|host| self.config.pins_for(host))
            .flatten()
            .map(String::as_str)
            .collect();

        let mut pinned_anchors = Vec::new();
        for anchor in &roots.roots {
            let pin = trust_anchor_pin(anchor);
            if !configured.contains(pin.as_str()) {
                continue;
            }
            let single = RootCertStore {
                roots: vec![anchor.clone()],
            };
            match tls::system_verifier(single, Arc::clone(provider)) {
                Ok(verifier) => pinned_anchors.push(PinnedAnchor { pin, verifier }),
                Err(e) => tracing::debug!(error = %e, "skipping unusable pinned trust anchor"),
            }
        }
        tracing::debug!(count = pinned_anchors.len(), "registered pinned trust anchors");

        self.pinned_anchors = pinned_anchors;
        self
    }

    #[must_use]
    pub fn configuration(&self) -> &PinningConfiguration {
        &self.config
    }

    fn matches_any_pin(trust: &ServerTrust<'_>, pins: &[String]) -> bool {
        trust.certificates().any(|cert| match spki_pin(cert) {
            Ok(pin) => pins.contains(&pin),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable certificate in presented chain");
                false
            }
        })
    }

    fn matches_anchor_pin(
        &self,
        trust: &ServerTrust<'_>,
        server_name: &ServerName<'_>,
        pins: &[String],
    ) -> bool {
        self.pinned_anchors
            .iter()
            .filter(|anchor| pins.contains(&anchor.pin))
            .any(|anchor| {
                anchor
                    .verifier
                    .verify_server_cert(
                        trust.end_entity,
                        trust.intermediates,
                        server_name,
                        trust.ocsp_response,
                        trust.now,
                    )
                    .is_ok()
            })
    }
}

impl PinValidator for SpkiPinValidator {
    fn evaluate_trust(&self, trust: &ServerTrust<'_>, hostname: &str) -> PinValidation {
        let Some(pins) = self.config.pins_for(hostname) else {
            return PinValidation::DomainNotPinned;
        };

        let Ok(dns_name) = DnsName::try_from(hostname) else {
            tracing::warn!(host = %hostname, "pinned host is not a valid DNS name");
            return PinValidation::ShouldBlockConnection;
        };
        let server_name = ServerName::DnsName(dns_name);

        if let Err(e) = self.system_verifier.verify_server_cert(
            trust.end_entity,
            trust.intermediates,
            &server_name,
            trust.ocsp_response,
            trust.now,
        ) {
            tracing::warn!(
                host = %hostname,
                error = %e,
                "certificate chain failed standard validation for pinned host"
            );
            return PinValidation::ShouldBlockConnection;
        }

        if Self::matches_any_pin(trust, pins)
            || self.matches_anchor_pin(trust, &server_name, pins)
        {
            return PinValidation::ShouldAllowConnection;
        }

        if self.config.enforce_validation() {
            tracing::warn!(host = %hostname, "certificate pin mismatch, blocking connection");
            PinValidation::ShouldBlockConnection
        } else {
            tracing::warn!(
                host = %hostname,
                "certificate pin mismatch, not enforced; allowing connection"
            );
            PinValidation::ShouldAllowConnection
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::TlsRootConfig;
    use crate::pinning::test_certs::{TestChain, chain_for};
    use crate::tls;
    use tracing_test::traced_test;

    fn verifier_trusting(ca: &CertificateDer<'static>) -> Arc<dyn ServerCertVerifier> {
        let roots = tls::root_store(TlsRootConfig::WebPki, std::slice::from_ref(ca)).unwrap();
        tls::system_verifier(roots, tls::get_crypto_provider()).unwrap()
    }

    fn roots_trusting(ca: &CertificateDer<'static>) -> RootCertStore {
        tls::root_store(TlsRootConfig::WebPki, std::slice::from_ref(ca)).unwrap()
    }

    fn validator(chain: &TestChain, pins: &[&str], enforce: bool) -> SpkiPinValidator {
        let config = PinningConfiguration::new([("api.example.com", pins.to_vec())], enforce);
        SpkiPinValidator::new(config, verifier_trusting(&chain.ca))
    }

    #[test]
    fn test_spki_pin_is_stable_base64_sha256() {
        let chain = chain_for(&["api.example.com"]);
        let pin = spki_pin(&chain.leaf).unwrap();

        assert_eq!(pin, spki_pin(&chain.leaf).unwrap());
        assert_eq!(pin.len(), 44, "base64 of a 32-byte digest");
        assert_ne!(pin, spki_pin(&chain.ca).unwrap());

        let expected = STANDARD.encode(Sha256::digest(chain.leaf_key.public_key_der()));
        assert_eq!(pin, expected);
    }

    #[test]
    fn test_spki_pin_rejects_garbage() {
        assert!(spki_pin(&CertificateDer::from(vec![1, 2, 3])).is_err());
    }

    #[test]
    fn test_unpinned_host_is_not_pinned() {
        let chain = chain_for(&["other.example.com"]);
        let validator = validator(&chain, &["irrelevant"], true);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "other.example.com"),
            PinValidation::DomainNotPinned
        );
    }

    #[test]
    fn test_leaf_pin_match_allows() {
        let chain = chain_for(&["api.example.com"]);
        let leaf_pin = spki_pin(&chain.leaf).unwrap();
        let validator = validator(&chain, &["unrelated", leaf_pin.as_str()], true);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldAllowConnection
        );
    }

    #[test]
    fn test_intermediate_pin_match_allows() {
        let chain = chain_for(&["api.example.com"]);
        let ca_pin = spki_pin(&chain.ca).unwrap();
        let validator = validator(&chain, &[ca_pin.as_str()], true);
        let intermediates = [chain.ca.clone()];
        let trust = ServerTrust::new(&chain.leaf, &intermediates);

        assert_eq!(
            validator.evaluate_trust(&trust, "API.example.com"),
            PinValidation::ShouldAllowConnection
        );
    }

    #[test]
    fn test_trust_anchor_pin_matches_certificate_pin() {
        let chain = chain_for(&["api.example.com"]);
        let roots = roots_trusting(&chain.ca);
        let ca_pin = spki_pin(&chain.ca).unwrap();

        assert!(
            roots
                .roots
                .iter()
                .any(|anchor| trust_anchor_pin(anchor) == ca_pin)
        );
    }

    #[test]
    fn test_der_sequence_uses_long_form_lengths() {
        assert_eq!(der_sequence(&[1, 2]), vec![0x30, 2, 1, 2]);

        let long = vec![0u8; 300];
        let encoded = der_sequence(&long);
        assert_eq!(&encoded[..4], &[0x30, 0x82, 0x01, 0x2c]);
        assert_eq!(encoded.len(), 304);
    }

    #[test]
    fn test_root_pin_matches_when_server_sends_only_its_leaf() {
        let chain = chain_for(&["api.example.com"]);
        let ca_pin = spki_pin(&chain.ca).unwrap();
        let config = PinningConfiguration::new([("api.example.com", [ca_pin])], true);
        let validator = SpkiPinValidator::new(config, verifier_trusting(&chain.ca))
            .with_trust_anchors(&roots_trusting(&chain.ca), &tls::get_crypto_provider());
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldAllowConnection
        );
    }

    #[test]
    fn test_root_pin_needs_registered_trust_anchors() {
        let chain = chain_for(&["api.example.com"]);
        let validator = validator(&chain, &[spki_pin(&chain.ca).unwrap().as_str()], true);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldBlockConnection
        );
    }

    #[test]
    fn test_pinned_root_must_anchor_the_presented_chain() {
        let chain = chain_for(&["api.example.com"]);
        let other = chain_for(&["api.example.com"]);
        let other_pin = spki_pin(&other.ca).unwrap();
        let config = PinningConfiguration::new([("api.example.com", [other_pin])], true);

        let mut roots = roots_trusting(&chain.ca);
        roots.add(other.ca.clone()).unwrap();
        let provider = tls::get_crypto_provider();
        let system = tls::system_verifier(roots.clone(), Arc::clone(&provider)).unwrap();
        let validator = SpkiPinValidator::new(config, system).with_trust_anchors(&roots, &provider);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldBlockConnection
        );
    }

    #[test]
    #[traced_test]
    fn test_mismatch_blocks_when_enforced() {
        let chain = chain_for(&["api.example.com"]);
        let validator = validator(&chain, &["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="], true);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldBlockConnection
        );
        assert!(logs_contain("certificate pin mismatch, blocking connection"));
    }

    #[test]
    #[traced_test]
    fn test_mismatch_is_logged_and_allowed_when_not_enforced() {
        let chain = chain_for(&["api.example.com"]);
        let validator = validator(&chain, &["AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="], false);
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldAllowConnection
        );
        assert!(logs_contain("not enforced"));
    }

    #[test]
    fn test_untrusted_chain_blocks_even_without_enforcement() {
        let chain = chain_for(&["api.example.com"]);
        let stranger = chain_for(&["api.example.com"]);
        let leaf_pin = spki_pin(&chain.leaf).unwrap();
        let config = PinningConfiguration::new([("api.example.com", [leaf_pin])], false);
        let validator = SpkiPinValidator::new(config, verifier_trusting(&stranger.ca));
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "api.example.com"),
            PinValidation::ShouldBlockConnection
        );
    }

    #[test]
    fn test_wrong_hostname_for_certificate_blocks() {
        let chain = chain_for(&["api.example.com"]);
        let leaf_pin = spki_pin(&chain.leaf).unwrap();
        let config = PinningConfiguration::new([("www.example.com", [leaf_pin])], true);
        let validator = SpkiPinValidator::new(config, verifier_trusting(&chain.ca));
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "www.example.com"),
            PinValidation::ShouldBlockConnection
        );
    }

    #[test]
    fn test_invalid_dns_name_for_pinned_entry_blocks() {
        let chain = chain_for(&["api.example.com"]);
        let config = PinningConfiguration::new([("bad host!", ["pin"])], true);
        let validator = SpkiPinValidator::new(config, verifier_trusting(&chain.ca));
        let trust = ServerTrust::new(&chain.leaf, &[]);

        assert_eq!(
            validator.evaluate_trust(&trust, "bad host!"),
            PinValidation::ShouldBlockConnection
        );
    }
}
