//! Certificate trust provider
//!
//! The channel asks the provider for the local application identity and for a
//! verdict on every server certificate. A rejection is fatal for the channel.

use crate::asymmetric::PrivateKey;
use crate::certificate::Certificate;
use opcua_core::StatusCode;
use std::collections::HashSet;
use std::time::SystemTime;

/// Verdict on a remote certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Trusted,
    Rejected(StatusCode),
}

impl TrustDecision {
    pub fn is_trusted(&self) -> bool {
        *self == TrustDecision::Trusted
    }
}

/// Certificate and private key of the local application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub certificate: Certificate,
    pub private_key: PrivateKey,
}

/// Source of the local identity and judge of remote certificates
#[cfg_attr(test, mockall::automock)]
pub trait CertificateTrustProvider: Send + Sync {
    /// Certificate and key of the application, if it has one
    fn local_identity(&self, application_uri: &str) -> Option<LocalIdentity>;

    /// Decide whether a server certificate is trusted
    fn validate_remote(&self, certificate: &Certificate) -> TrustDecision;
}

/// In-memory trust list keyed by certificate thumbprint
#[derive(Debug, Clone, Default)]
pub struct TrustList {
    trusted: HashSet<[u8; 20]>,
    identity: Option<LocalIdentity>,
    trust_all: bool,
}

impl TrustList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `identity` as the local application identity
    pub fn with_identity(mut self, identity: LocalIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Accept every certificate that is inside its validity period
    pub fn trust_all(mut self) -> Self {
        self.trust_all = true;
        self
    }

    /// Add a certificate to the trusted set
    pub fn trust(&mut self, certificate: &Certificate) {
        self.trusted.insert(certificate.thumbprint());
    }

    /// Remove a certificate from the trusted set
    pub fn revoke(&mut self, certificate: &Certificate) {
        self.trusted.remove(&certificate.thumbprint());
    }
}

impl CertificateTrustProvider for TrustList {
    fn local_identity(&self, _application_uri: &str) -> Option<LocalIdentity> {
        self.identity.clone()
    }

    fn validate_remote(&self, certificate: &Certificate) -> TrustDecision {
        if !certificate.is_time_valid(SystemTime::now()) {
            log::warn!("Certificate {} is outside its validity period", certificate.thumbprint_hex());
            return TrustDecision::Rejected(StatusCode::BAD_CERTIFICATE_TIME_INVALID);
        }
        if self.trust_all || self.trusted.contains(&certificate.thumbprint()) {
            TrustDecision::Trusted
        } else {
            log::warn!("Certificate {} is not trusted", certificate.thumbprint_hex());
            TrustDecision::Rejected(StatusCode::BAD_CERTIFICATE_UNTRUSTED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_helpers() {
        assert!(TrustDecision::Trusted.is_trusted());
        assert!(!TrustDecision::Rejected(StatusCode::BAD_CERTIFICATE_UNTRUSTED).is_trusted());
    }

    #[test]
    fn test_empty_trust_list_has_no_identity() {
        let list = TrustList::new();
        assert!(list.local_identity("urn:client").is_none());
    }

    #[test]
    fn test_mock_provider() {
        let mut provider = MockCertificateTrustProvider::new();
        provider.expect_local_identity().returning(|_| None);
        assert!(provider.local_identity("urn:test").is_none());
    }
}
