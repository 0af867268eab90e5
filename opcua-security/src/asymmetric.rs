//! RSA primitives used by the asymmetric security header and user tokens
//!
//! Signatures are RSA-PKCS#1-v1.5 with SHA-256; encryption is RSA-OAEP with
//! SHA-1, processed in blocks of `key_size - 42` plaintext bytes.

use opcua_core::{UaError, UaResult};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// OAEP-SHA1 overhead per block
const OAEP_SHA1_OVERHEAD: usize = 42;

fn security_error(message: String) -> UaError {
    UaError::SecurityChecksFailed(message)
}

/// RSA private key of the local application or of an X509 user identity
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(RsaPrivateKey);

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({} bits)", self.0.size() * 8)
    }
}

impl PrivateKey {
    /// Parse a PKCS#8 or PKCS#1 DER encoded key
    pub fn from_der(der: &[u8]) -> UaResult<Self> {
        RsaPrivateKey::from_pkcs8_der(der)
            .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
            .map(PrivateKey)
            .map_err(|e| security_error(format!("Invalid RSA private key: {}", e)))
    }

    /// Generate a new key
    pub fn generate(bits: usize) -> UaResult<Self> {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, bits)
            .map(PrivateKey)
            .map_err(|e| security_error(format!("RSA key generation failed: {}", e)))
    }

    /// Matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    /// Modulus size in bytes
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// RSA-PKCS#1-v1.5 signature over the SHA-256 digest of `data`
    pub fn sign_sha256(&self, data: &[u8]) -> UaResult<Vec<u8>> {
        let digest = Sha256::digest(data);
        self.0
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|e| security_error(format!("RSA signing failed: {}", e)))
    }

    /// Decrypt RSA-OAEP-SHA1 ciphertext made of whole key-size blocks
    pub fn decrypt_oaep(&self, data: &[u8]) -> UaResult<Vec<u8>> {
        let block = self.size();
        if data.is_empty() || data.len() % block != 0 {
            return Err(security_error(format!(
                "Ciphertext length {} is not a multiple of {}",
                data.len(),
                block
            )));
        }
        let mut plain = Vec::with_capacity(data.len());
        for chunk in data.chunks(block) {
            let decrypted = self
                .0
                .decrypt(Oaep::new::<Sha1>(), chunk)
                .map_err(|e| security_error(format!("RSA decryption failed: {}", e)))?;
            plain.extend_from_slice(&decrypted);
        }
        Ok(plain)
    }
}

/// RSA public key of a remote party
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.0.size() * 8)
    }
}

impl PublicKey {
    /// Parse a DER encoded SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> UaResult<Self> {
        RsaPublicKey::from_public_key_der(der)
            .map(PublicKey)
            .map_err(|e| security_error(format!("Invalid RSA public key: {}", e)))
    }

    /// Encode as DER SubjectPublicKeyInfo
    pub fn to_spki_der(&self) -> UaResult<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| security_error(format!("Failed to encode public key: {}", e)))
    }

    /// Modulus size in bytes
    pub fn size(&self) -> usize {
        self.0.size()
    }

    /// Plaintext bytes that fit in one OAEP-SHA1 block
    pub fn plain_block_size(&self) -> usize {
        self.size().saturating_sub(OAEP_SHA1_OVERHEAD)
    }

    /// Ciphertext size for `plain_len` bytes of plaintext
    pub fn encrypted_size(&self, plain_len: usize) -> usize {
        let block = self.plain_block_size().max(1);
        plain_len.div_ceil(block) * self.size()
    }

    /// Verify an RSA-PKCS#1-v1.5 SHA-256 signature
    ///
    /// # Errors
    /// Returns `BadSecurityChecksFailed` when the signature is invalid
    pub fn verify_sha256(&self, data: &[u8], signature: &[u8]) -> UaResult<()> {
        let digest = Sha256::digest(data);
        self.0
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .map_err(|_| security_error("Asymmetric signature verification failed".to_string()))
    }

    /// Encrypt with RSA-OAEP-SHA1, splitting into as many blocks as needed
    pub fn encrypt_oaep(&self, data: &[u8]) -> UaResult<Vec<u8>> {
        let block = self.plain_block_size();
        if block == 0 {
            return Err(security_error("RSA key too small for OAEP".to_string()));
        }
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(self.encrypted_size(data.len()));
        for chunk in data.chunks(block) {
            let encrypted = self
                .0
                .encrypt(&mut rng, Oaep::new::<Sha1>(), chunk)
                .map_err(|e| security_error(format!("RSA encryption failed: {}", e)))?;
            out.extend_from_slice(&encrypted);
        }
        Ok(out)
    }
}
