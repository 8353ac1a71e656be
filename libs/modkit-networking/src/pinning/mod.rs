//! Certificate pinning.
//!
//! A [`TrustEvaluator`] turns a presented certificate chain and hostname into
//! a [`TrustDecision`]. The [`CertificateValidationGate`] consults it for every
//! TLS handshake and decides whether to accept the chain, fail the handshake
//! or fall back to standard system trust. [`PinningCertVerifier`] installs the
//! gate into rustls.
//!
//! Pins are base64-encoded SHA-256 digests of a certificate's DER
//! `SubjectPublicKeyInfo`, the same format HPKP and most mobile pinning
//! libraries use. A chain matches when any presented certificate's pin is
//! configured for the host.

mod evaluator;
mod gate;
mod spki;
mod verifier;

pub use evaluator::TrustEvaluator;
pub use gate::{AuthenticationChallenge, CertificateValidationGate, ChallengeDisposition};
pub use spki::{SpkiPinValidator, spki_pin, trust_anchor_pin};
pub use verifier::PinningCertVerifier;

use rustls_pki_types::{CertificateDer, UnixTime};
use std::fmt::Debug;

/// Certificate material presented by a server during a TLS handshake
#[derive(Debug, Clone, Copy)]
pub struct ServerTrust<'a> {
    /// Leaf certificate
    pub end_entity: &'a CertificateDer<'a>,
    /// Remaining presented chain, leaf issuer first
    pub intermediates: &'a [CertificateDer<'a>],
    /// Stapled OCSP response, empty when none was sent
    pub ocsp_response: &'a [u8],
    /// Verification time
    pub now: UnixTime,
}

impl<'a> ServerTrust<'a> {
    /// Chain verified at the current time, without OCSP stapling
    #[must_use]
    pub fn new(end_entity: &'a CertificateDer<'a>, intermediates: &'a [CertificateDer<'a>]) -> Self {
        Self {
            end_entity,
            intermediates,
            ocsp_response: &[],
            now: UnixTime::now(),
        }
    }

    /// Every presented certificate, leaf first
    pub fn certificates(&self) -> impl Iterator<Item = &'a CertificateDer<'a>> {
        std::iter::once(self.end_entity).chain(self.intermediates.iter())
    }
}

/// Outcome reported by a [`PinValidator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinValidation {
    ShouldAllowConnection,
    ShouldBlockConnection,
    DomainNotPinned,
    /// The validator could not reach a verdict
    Indeterminate,
}

/// Trust decision for one handshake
///
/// `DomainNotPinned` and `DeferToDefaultHandling` both resolve to standard
/// system trust evaluation; they differ only for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Allow,
    Block,
    DomainNotPinned,
    DeferToDefaultHandling,
}

/// Pin-matching engine consulted by the [`TrustEvaluator`]
///
/// Implementations must be pure with respect to their configuration: no I/O,
/// safe to call concurrently from many handshakes.
pub trait PinValidator: Debug + Send + Sync {
    fn evaluate_trust(&self, trust: &ServerTrust<'_>, hostname: &str) -> PinValidation;
}
