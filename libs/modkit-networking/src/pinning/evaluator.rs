use super::{PinValidation, PinValidator, ServerTrust, SpkiPinValidator, TrustDecision};
use crate::config::PinningConfiguration;
use rustls::RootCertStore;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use std::sync::Arc;

/// Evaluates presented certificate chains against the pinned-domain configuration
///
/// Configured once, at construction; there is no way to re-configure it or
/// to evaluate before it is configured. Evaluation is a pure function of the
/// configuration and its inputs and may run concurrently from many handshakes.
#[derive(Debug, Clone)]
pub struct TrustEvaluator {
    validator: Arc<dyn PinValidator>,
}

impl TrustEvaluator {
    /// Evaluator backed by [`SpkiPinValidator`]
    ///
    /// `system_verifier` performs the standard chain-of-trust check that pinned
    /// hosts must pass before their pins are compared.
    #[must_use]
    pub fn new(config: PinningConfiguration, system_verifier: Arc<dyn ServerCertVerifier>) -> Self {
        Self::with_validator(Arc::new(SpkiPinValidator::new(config, system_verifier)))
    }

    /// Like [`new`](Self::new), but pins may also match the root in `roots`
    /// that a presented chain is anchored in
    #[must_use]
    pub fn with_trust_anchors(
        config: PinningConfiguration,
        system_verifier: Arc<dyn ServerCertVerifier>,
        roots: &RootCertStore,
        provider: &Arc<CryptoProvider>,
    ) -> Self {
        let validator =
            SpkiPinValidator::new(config, system_verifier).with_trust_anchors(roots, provider);
        Self::with_validator(Arc::new(validator))
    }

    /// Evaluator backed by a custom pin-matching engine
    #[must_use]
    pub fn with_validator(validator: Arc<dyn PinValidator>) -> Self {
        Self { validator }
    }

    #[must_use]
    pub fn evaluate(&self, trust: &ServerTrust<'_>, hostname: &str) -> TrustDecision {
        let decision = match self.validator.evaluate_trust(trust, hostname) {
            PinValidation::ShouldAllowConnection => TrustDecision::Allow,
            PinValidation::ShouldBlockConnection => TrustDecision::Block,
            PinValidation::DomainNotPinned => TrustDecision::DomainNotPinned,
            PinValidation::Indeterminate => TrustDecision::DeferToDefaultHandling,
        };
        tracing::debug!(host = %hostname, ?decision, "evaluated server trust");
        decision
    }
}
