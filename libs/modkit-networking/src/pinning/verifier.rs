use super::{AuthenticationChallenge, CertificateValidationGate, ChallengeDisposition, ServerTrust};
use crate::error::PinningRejected;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, OtherError, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// rustls server certificate verifier that applies the pinning gate
///
/// `UseCredential` accepts the chain, `PerformDefaultHandling` delegates to the
/// standard verifier and `CancelAuthenticationChallenge` fails the handshake
/// with a [`PinningRejected`] marker in the error. Handshake signatures are
/// always checked by the standard verifier.
#[derive(Debug)]
pub struct PinningCertVerifier {
    gate: CertificateValidationGate,
    default_verifier: Arc<dyn ServerCertVerifier>,
}

impl PinningCertVerifier {
    #[must_use]
    pub fn new(gate: CertificateValidationGate, default_verifier: Arc<dyn ServerCertVerifier>) -> Self {
        Self {
            gate,
            default_verifier,
        }
    }
}

impl ServerCertVerifier for PinningCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let host = match server_name {
            ServerName::DnsName(name) => Some(name.as_ref()),
            _ => None,
        };
        let challenge = AuthenticationChallenge {
            server_trust: Some(ServerTrust {
                end_entity,
                intermediates,
                ocsp_response,
                now,
            }),
            host,
        };

        match self.gate.handle_challenge(&challenge) {
            ChallengeDisposition::UseCredential(verified) => Ok(verified),
            ChallengeDisposition::PerformDefaultHandling => self.default_verifier.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ),
            ChallengeDisposition::CancelAuthenticationChallenge => {
                let rejected = PinningRejected {
                    host: host.unwrap_or_default().to_owned(),
                };
                Err(rustls::Error::InvalidCertificate(CertificateError::Other(
                    OtherError(Arc::new(rejected)),
                )))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.default_verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.default_verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.default_verifier.supported_verify_schemes()
    }
}
