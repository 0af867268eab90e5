//! User identities and legacy secret encryption

use crate::asymmetric::{PrivateKey, PublicKey};
use crate::certificate::Certificate;
use crate::policy::SecurityPolicy;
use opcua_core::{StatusCode, UaError, UaResult};
use std::fmt;

/// Identity presented in ActivateSession
#[derive(Clone, PartialEq, Eq, Default)]
pub enum UserIdentity {
    #[default]
    Anonymous,
    UserName {
        user: String,
        password: String,
    },
    X509 {
        certificate: Certificate,
        private_key: PrivateKey,
    },
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserIdentity::Anonymous => f.write_str("Anonymous"),
            UserIdentity::UserName { user, .. } => f.debug_struct("UserName").field("user", user).finish_non_exhaustive(),
            UserIdentity::X509 { certificate, .. } => f
                .debug_struct("X509")
                .field("certificate", certificate)
                .finish_non_exhaustive(),
        }
    }
}

impl UserIdentity {
    pub fn user_name(user: impl Into<String>, password: impl Into<String>) -> Self {
        UserIdentity::UserName {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// A secret prepared for an identity token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedSecret {
    pub data: Vec<u8>,
    /// Encryption algorithm URI, `None` when sent in clear
    pub algorithm: Option<&'static str>,
}

/// Encrypt a password in the legacy `length ‖ secret ‖ serverNonce` format
///
/// With `SecurityPolicy::None` the secret is returned unencrypted.
///
/// # Errors
/// Returns `BadIdentityTokenInvalid` when encryption is required but the
/// server key or nonce is missing.
pub fn encrypt_legacy_secret(
    policy: SecurityPolicy,
    secret: &[u8],
    server_nonce: &[u8],
    server_key: Option<&PublicKey>,
) -> UaResult<EncryptedSecret> {
    if policy.is_none() {
        return Ok(EncryptedSecret {
            data: secret.to_vec(),
            algorithm: None,
        });
    }
    let key = server_key.ok_or(UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_INVALID))?;
    if server_nonce.len() < policy.nonce_length() {
        return Err(UaError::IdentityTokenRejected(StatusCode::BAD_NONCE_INVALID));
    }
    let length = u32::try_from(secret.len() + server_nonce.len())
        .map_err(|_| UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_INVALID))?;
    let mut plain = Vec::with_capacity(4 + length as usize);
    plain.extend_from_slice(&length.to_le_bytes());
    plain.extend_from_slice(secret);
    plain.extend_from_slice(server_nonce);
    Ok(EncryptedSecret {
        data: key.encrypt_oaep(&plain)?,
        algorithm: Some(policy.asymmetric_encryption_algorithm()),
    })
}

/// Reverse of `encrypt_legacy_secret`, checking the embedded nonce
pub fn decrypt_legacy_secret(key: &PrivateKey, data: &[u8], server_nonce: &[u8]) -> UaResult<Vec<u8>> {
    let plain = key.decrypt_oaep(data)?;
    let invalid = || UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_INVALID);
    if plain.len() < 4 {
        return Err(invalid());
    }
    let length = u32::from_le_bytes([plain[0], plain[1], plain[2], plain[3]]) as usize;
    let body = &plain[4..];
    if length != body.len() || length < server_nonce.len() {
        return Err(invalid());
    }
    let (secret, nonce) = body.split_at(length - server_nonce.len());
    if nonce != server_nonce {
        return Err(invalid());
    }
    Ok(secret.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_policy_sends_plain() {
        let secret = encrypt_legacy_secret(SecurityPolicy::None, b"pw", &[], None).unwrap();
        assert_eq!(secret.data, b"pw");
        assert!(secret.algorithm.is_none());
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = encrypt_legacy_secret(SecurityPolicy::Basic256Sha256, b"pw", &[0; 32], None).unwrap_err();
        assert!(matches!(err, UaError::IdentityTokenRejected(_)));
    }

    #[test]
    fn test_legacy_round_trip() {
        let key = PrivateKey::generate(1024).unwrap();
        let nonce = [4u8; 32];
        let secret = encrypt_legacy_secret(
            SecurityPolicy::Aes128Sha256RsaOaep,
            b"s3cr3t",
            &nonce,
            Some(&key.public_key()),
        )
        .unwrap();
        assert_eq!(secret.algorithm, Some("http://www.w3.org/2001/04/xmlenc#rsa-oaep"));
        assert_eq!(decrypt_legacy_secret(&key, &secret.data, &nonce).unwrap(), b"s3cr3t");
        assert!(decrypt_legacy_secret(&key, &secret.data, &[5u8; 32]).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let identity = UserIdentity::user_name("operator", "hunter2");
        assert!(!format!("{:?}", identity).contains("hunter2"));
    }
}
