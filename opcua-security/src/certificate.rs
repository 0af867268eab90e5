//! X.509 certificates in DER form

use crate::asymmetric::PublicKey;
use opcua_core::{ByteString, StatusCode, UaError, UaResult};
use sha1::{Digest, Sha1};
use std::fmt;
use std::time::SystemTime;
use x509_cert::der::{Decode, Encode};

/// SHA-1 thumbprint of DER bytes
pub fn thumbprint_of(der: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Sha1::digest(der));
    out
}

/// Parsed X.509 certificate
///
/// Keeps the original DER bytes, which are what goes on the wire and into
/// signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    parsed: x509_cert::Certificate,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("thumbprint", &self.thumbprint_hex())
            .finish()
    }
}

impl Certificate {
    /// Parse a DER encoded certificate
    ///
    /// # Errors
    /// Returns `BadCertificateInvalid` when the bytes are not a certificate
    pub fn from_der(der: impl Into<Vec<u8>>) -> UaResult<Self> {
        let der = der.into();
        let parsed = x509_cert::Certificate::from_der(&der).map_err(|e| {
            UaError::protocol(
                StatusCode::BAD_CERTIFICATE_INVALID,
                format!("Invalid certificate: {}", e),
            )
        })?;
        Ok(Self { der, parsed })
    }

    /// Parse the certificate carried in a ByteString, `None` when null or empty
    pub fn from_byte_string(bytes: &ByteString) -> UaResult<Option<Self>> {
        match bytes.as_bytes() {
            Some(der) if !der.is_empty() => Self::from_der(der.to_vec()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_byte_string(&self) -> ByteString {
        ByteString::from(self.der.clone())
    }

    /// SHA-1 thumbprint of the DER encoding
    pub fn thumbprint(&self) -> [u8; 20] {
        thumbprint_of(&self.der)
    }

    pub fn thumbprint_hex(&self) -> String {
        self.thumbprint().iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Subject distinguished name
    pub fn subject(&self) -> String {
        self.parsed.tbs_certificate.subject.to_string()
    }

    /// RSA public key from the SubjectPublicKeyInfo
    pub fn public_key(&self) -> UaResult<PublicKey> {
        let spki = self
            .parsed
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| {
                UaError::protocol(
                    StatusCode::BAD_CERTIFICATE_INVALID,
                    format!("Invalid public key info: {}", e),
                )
            })?;
        PublicKey::from_spki_der(&spki)
    }

    /// Validity period as (not before, not after)
    pub fn validity(&self) -> (SystemTime, SystemTime) {
        let validity = &self.parsed.tbs_certificate.validity;
        (validity.not_before.to_system_time(), validity.not_after.to_system_time())
    }

    /// Whether `now` is inside the validity period
    pub fn is_time_valid(&self, now: SystemTime) -> bool {
        let (not_before, not_after) = self.validity();
        not_before <= now && now <= not_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_rejected() {
        let err = Certificate::from_der(vec![0x30, 0x03, 0x02, 0x01, 0x00]).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_CERTIFICATE_INVALID);
    }

    #[test]
    fn test_null_byte_string_is_no_certificate() {
        assert!(Certificate::from_byte_string(&ByteString::null()).unwrap().is_none());
        assert!(Certificate::from_byte_string(&ByteString::from(Vec::new())).unwrap().is_none());
    }
}
