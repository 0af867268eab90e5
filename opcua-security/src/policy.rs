//! Security policies and message security modes

use opcua_core::{StatusCode, UaError, UaResult};
use std::fmt;

/// Supported security policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityPolicy {
    /// No signing or encryption
    #[default]
    None,
    /// HMAC-SHA256, AES-256-CBC, RSA-PKCS1-v1.5-SHA256, RSA-OAEP
    Basic256Sha256,
    /// HMAC-SHA256, AES-128-CBC, RSA-PKCS1-v1.5-SHA256, RSA-OAEP
    Aes128Sha256RsaOaep,
}

impl SecurityPolicy {
    const URI_NONE: &'static str = "http://opcfoundation.org/UA/SecurityPolicy#None";
    const URI_BASIC256SHA256: &'static str = "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";
    const URI_AES128: &'static str = "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep";

    /// Policy URI
    pub fn uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => Self::URI_NONE,
            SecurityPolicy::Basic256Sha256 => Self::URI_BASIC256SHA256,
            SecurityPolicy::Aes128Sha256RsaOaep => Self::URI_AES128,
        }
    }

    /// Policy from its URI
    ///
    /// # Errors
    /// Returns `BadSecurityPolicyRejected` for unsupported policies
    pub fn from_uri(uri: &str) -> UaResult<Self> {
        match uri {
            Self::URI_NONE => Ok(SecurityPolicy::None),
            Self::URI_BASIC256SHA256 => Ok(SecurityPolicy::Basic256Sha256),
            Self::URI_AES128 => Ok(SecurityPolicy::Aes128Sha256RsaOaep),
            _ => Err(UaError::protocol(
                StatusCode::BAD_SECURITY_POLICY_REJECTED,
                format!("Unsupported security policy {}", uri),
            )),
        }
    }

    pub fn is_none(&self) -> bool {
        *self == SecurityPolicy::None
    }

    /// Length of the HMAC signing key
    pub fn signing_key_length(&self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            _ => 32,
        }
    }

    /// Length of the AES key
    pub fn encrypting_key_length(&self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            SecurityPolicy::Basic256Sha256 => 32,
            SecurityPolicy::Aes128Sha256RsaOaep => 16,
        }
    }

    /// AES block size, also the IV length
    pub fn encrypting_block_size(&self) -> usize {
        match self {
            SecurityPolicy::None => 1,
            _ => 16,
        }
    }

    /// Size of a symmetric (HMAC-SHA256) signature
    pub fn symmetric_signature_size(&self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            _ => 32,
        }
    }

    /// Length of the nonces exchanged in OpenSecureChannel and CreateSession
    pub fn nonce_length(&self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            _ => 32,
        }
    }

    /// Bytes lost to OAEP-SHA1 padding per RSA block
    pub fn asymmetric_padding_overhead(&self) -> usize {
        match self {
            SecurityPolicy::None => 0,
            _ => 42,
        }
    }

    /// Algorithm URI of the asymmetric signature
    pub fn asymmetric_signature_algorithm(&self) -> &'static str {
        match self {
            SecurityPolicy::None => "",
            _ => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
        }
    }

    /// Algorithm URI of the asymmetric encryption used for secrets
    pub fn asymmetric_encryption_algorithm(&self) -> &'static str {
        match self {
            SecurityPolicy::None => "",
            _ => "http://www.w3.org/2001/04/xmlenc#rsa-oaep",
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Message security mode of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MessageSecurityMode {
    Invalid = 0,
    #[default]
    None = 1,
    Sign = 2,
    SignAndEncrypt = 3,
}

impl MessageSecurityMode {
    pub fn id(&self) -> u32 {
        *self as u32
    }

    pub fn from_id(id: u32) -> UaResult<Self> {
        match id {
            0 => Ok(MessageSecurityMode::Invalid),
            1 => Ok(MessageSecurityMode::None),
            2 => Ok(MessageSecurityMode::Sign),
            3 => Ok(MessageSecurityMode::SignAndEncrypt),
            _ => Err(UaError::decoding(format!("Invalid MessageSecurityMode {}", id))),
        }
    }

    /// Chunks are signed
    pub fn signs(&self) -> bool {
        matches!(self, MessageSecurityMode::Sign | MessageSecurityMode::SignAndEncrypt)
    }

    /// Chunks are encrypted
    pub fn encrypts(&self) -> bool {
        *self == MessageSecurityMode::SignAndEncrypt
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSecurityMode::Invalid => "Invalid",
            MessageSecurityMode::None => "None",
            MessageSecurityMode::Sign => "Sign",
            MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for MessageSecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
