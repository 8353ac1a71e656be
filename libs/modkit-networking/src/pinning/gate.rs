use super::{ServerTrust, TrustDecision, TrustEvaluator};
use rustls::client::danger::ServerCertVerified;
use std::sync::Arc;

/// Server-trust challenge raised by the transport for one TLS handshake
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticationChallenge<'a> {
    /// Presented chain, absent when the transport could not provide one
    pub server_trust: Option<ServerTrust<'a>>,
    /// DNS hostname of the peer, absent for IP address targets
    pub host: Option<&'a str>,
}

/// How the transport must complete a challenge
#[derive(Debug)]
pub enum ChallengeDisposition {
    /// Accept the presented chain as trusted
    UseCredential(ServerCertVerified),
    /// Fail the handshake
    CancelAuthenticationChallenge,
    /// Fall back to standard system trust evaluation
    PerformDefaultHandling,
}

/// Authentication-challenge handler consulted by the transport per handshake
///
/// Holds no state besides the shared evaluator and the pinning switch, so one
/// gate serves any number of concurrent handshakes.
#[derive(Debug, Clone)]
pub struct CertificateValidationGate {
    evaluator: Arc<TrustEvaluator>,
    pinning_enabled: bool,
}

impl CertificateValidationGate {
    #[must_use]
    pub fn new(evaluator: Arc<TrustEvaluator>, pinning_enabled: bool) -> Self {
        Self {
            evaluator,
            pinning_enabled,
        }
    }

    #[must_use]
    pub fn pinning_enabled(&self) -> bool {
        self.pinning_enabled
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<TrustEvaluator> {
        &self.evaluator
    }

    #[must_use]
    pub fn handle_challenge(&self, challenge: &AuthenticationChallenge<'_>) -> ChallengeDisposition {
        if !self.pinning_enabled {
            return ChallengeDisposition::PerformDefaultHandling;
        }

        let (Some(trust), Some(host)) = (challenge.server_trust.as_ref(), challenge.host) else {
            tracing::debug!("server trust or host missing, using default handling");
            return ChallengeDisposition::PerformDefaultHandling;
        };

        match self.evaluator.evaluate(trust, host) {
            TrustDecision::Allow => ChallengeDisposition::UseCredential(ServerCertVerified::assertion()),
            TrustDecision::Block => {
                tracing::warn!(host = %host, "certificate pinning rejected server trust");
                ChallengeDisposition::CancelAuthenticationChallenge
            }
            TrustDecision::DomainNotPinned | TrustDecision::DeferToDefaultHandling => {
                ChallengeDisposition::PerformDefaultHandling
            }
        }
    }
}
