//! Symmetric primitives: HMAC-SHA256 signatures and AES-CBC encryption

use crate::policy::SecurityPolicy;
use aes::{Aes128, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use opcua_core::{UaError, UaResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signing key, encrypting key and IV of one direction of a channel
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKeys {
    policy: SecurityPolicy,
    signing_key: Vec<u8>,
    encrypting_key: Vec<u8>,
    iv: Vec<u8>,
}

impl std::fmt::Debug for SymmetricKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeys")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn security_error(message: String) -> UaError {
    UaError::SecurityChecksFailed(message)
}

impl SymmetricKeys {
    /// Create keys, checking their lengths against the policy
    pub fn new(policy: SecurityPolicy, signing_key: Vec<u8>, encrypting_key: Vec<u8>, iv: Vec<u8>) -> UaResult<Self> {
        if policy.is_none() {
            return Ok(Self {
                policy,
                signing_key: Vec::new(),
                encrypting_key: Vec::new(),
                iv: Vec::new(),
            });
        }
        if signing_key.len() != policy.signing_key_length()
            || encrypting_key.len() != policy.encrypting_key_length()
            || iv.len() != policy.encrypting_block_size()
        {
            return Err(security_error(format!(
                "Key lengths {}/{}/{} do not match {}",
                signing_key.len(),
                encrypting_key.len(),
                iv.len(),
                policy
            )));
        }
        Ok(Self {
            policy,
            signing_key,
            encrypting_key,
            iv,
        })
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    pub fn encrypting_key(&self) -> &[u8] {
        &self.encrypting_key
    }

    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    fn mac(&self) -> UaResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| security_error(format!("Failed to create HMAC: {}", e)))
    }

    /// HMAC-SHA256 over `data`
    pub fn sign(&self, data: &[u8]) -> UaResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Check an HMAC-SHA256 signature in constant time
    ///
    /// # Errors
    /// Returns `BadSecurityChecksFailed` when the signature does not match
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> UaResult<()> {
        let mut mac = self.mac()?;
        mac.update(data);
        mac.verify_slice(signature)
            .map_err(|_| security_error("Symmetric signature verification failed".to_string()))
    }

    /// Encrypt `data` in place; its length must be a multiple of the block size
    pub fn encrypt(&self, data: &mut [u8]) -> UaResult<()> {
        self.check_block_aligned(data.len())?;
        let len = data.len();
        let result = match self.encrypting_key.len() {
            16 => cbc::Encryptor::<Aes128>::new_from_slices(&self.encrypting_key, &self.iv)
                .map_err(|e| security_error(format!("Invalid AES key: {}", e)))?
                .encrypt_padded_mut::<NoPadding>(data, len)
                .map(|_| ()),
            32 => cbc::Encryptor::<Aes256>::new_from_slices(&self.encrypting_key, &self.iv)
                .map_err(|e| security_error(format!("Invalid AES key: {}", e)))?
                .encrypt_padded_mut::<NoPadding>(data, len)
                .map(|_| ()),
            other => return Err(security_error(format!("Unsupported AES key length {}", other))),
        };
        result.map_err(|_| security_error("AES-CBC encryption failed".to_string()))
    }

    /// Decrypt `data` in place; its length must be a multiple of the block size
    pub fn decrypt(&self, data: &mut [u8]) -> UaResult<()> {
        self.check_block_aligned(data.len())?;
        let result = match self.encrypting_key.len() {
            16 => cbc::Decryptor::<Aes128>::new_from_slices(&self.encrypting_key, &self.iv)
                .map_err(|e| security_error(format!("Invalid AES key: {}", e)))?
                .decrypt_padded_mut::<NoPadding>(data)
                .map(|_| ()),
            32 => cbc::Decryptor::<Aes256>::new_from_slices(&self.encrypting_key, &self.iv)
                .map_err(|e| security_error(format!("Invalid AES key: {}", e)))?
                .decrypt_padded_mut::<NoPadding>(data)
                .map(|_| ()),
            other => return Err(security_error(format!("Unsupported AES key length {}", other))),
        };
        result.map_err(|_| security_error("AES-CBC decryption failed".to_string()))
    }

    fn check_block_aligned(&self, len: usize) -> UaResult<()> {
        let block = self.policy.encrypting_block_size();
        if len % block != 0 {
            return Err(security_error(format!(
                "Length {} is not a multiple of the block size {}",
                len, block
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(policy: SecurityPolicy) -> SymmetricKeys {
        SymmetricKeys::new(
            policy,
            vec![7u8; policy.signing_key_length()],
            vec![9u8; policy.encrypting_key_length()],
            vec![3u8; policy.encrypting_block_size()],
        )
        .unwrap()
    }

    #[test]
    fn test_sign_verify() {
        let keys = keys(SecurityPolicy::Basic256Sha256);
        let signature = keys.sign(b"chunk").unwrap();
        assert_eq!(signature.len(), 32);
        assert!(keys.verify(b"chunk", &signature).is_ok());
        assert!(keys.verify(b"chunk!", &signature).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_both_key_sizes() {
        for policy in [SecurityPolicy::Basic256Sha256, SecurityPolicy::Aes128Sha256RsaOaep] {
            let keys = keys(policy);
            let plain = (0..64u8).collect::<Vec<_>>();
            let mut data = plain.clone();
            keys.encrypt(&mut data).unwrap();
            assert_ne!(data, plain);
            keys.decrypt(&mut data).unwrap();
            assert_eq!(data, plain);
        }
    }

    #[test]
    fn test_unaligned_rejected() {
        let keys = keys(SecurityPolicy::Aes128Sha256RsaOaep);
        let mut data = vec![0u8; 15];
        assert!(keys.encrypt(&mut data).is_err());
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        assert!(SymmetricKeys::new(SecurityPolicy::Basic256Sha256, vec![0; 32], vec![0; 16], vec![0; 16]).is_err());
    }
}
