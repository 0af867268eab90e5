//! P_SHA256 key derivation
//!
//! Both sides derive a signing key, an encrypting key and an IV from the
//! nonces exchanged in OpenSecureChannel. The client keys are
//! `P_SHA256(serverNonce, clientNonce)`, the server keys
//! `P_SHA256(clientNonce, serverNonce)`.

use crate::policy::SecurityPolicy;
use crate::symmetric::SymmetricKeys;
use hmac::{Hmac, Mac};
use opcua_core::{StatusCode, UaError, UaResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// TLS-style pseudo random function with HMAC-SHA256
///
/// `A(0) = seed`, `A(i) = HMAC(secret, A(i-1))`, output is the concatenation
/// of `HMAC(secret, A(i) ‖ seed)` truncated to `length`.
pub fn p_sha256(secret: &[u8], seed: &[u8], length: usize) -> UaResult<Vec<u8>> {
    let new_mac = || {
        HmacSha256::new_from_slice(secret)
            .map_err(|e| UaError::SecurityChecksFailed(format!("Failed to create HMAC: {}", e)))
    };
    let mut output = Vec::with_capacity(length + 32);
    let mut a = seed.to_vec();
    while output.len() < length {
        let mut mac = new_mac()?;
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();

        let mut mac = new_mac()?;
        mac.update(&a);
        mac.update(seed);
        output.extend_from_slice(&mac.finalize().into_bytes());
    }
    output.truncate(length);
    Ok(output)
}

/// Symmetric keys of both directions of a channel
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKeys {
    /// Keys used for client → server traffic
    pub client: SymmetricKeys,
    /// Keys used for server → client traffic
    pub server: SymmetricKeys,
}

impl std::fmt::Debug for ChannelKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelKeys").finish_non_exhaustive()
    }
}

fn derive(policy: SecurityPolicy, secret: &[u8], seed: &[u8]) -> UaResult<SymmetricKeys> {
    let signing_len = policy.signing_key_length();
    let encrypting_len = policy.encrypting_key_length();
    let iv_len = policy.encrypting_block_size();
    let material = p_sha256(secret, seed, signing_len + encrypting_len + iv_len)?;
    let (signing, rest) = material.split_at(signing_len);
    let (encrypting, iv) = rest.split_at(encrypting_len);
    SymmetricKeys::new(policy, signing.to_vec(), encrypting.to_vec(), iv.to_vec())
}

/// Derive the keys of both directions from the exchanged nonces
///
/// # Errors
/// Returns `BadNonceInvalid` when a nonce is shorter than the policy requires.
pub fn derive_channel_keys(
    policy: SecurityPolicy,
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> UaResult<ChannelKeys> {
    let required = policy.nonce_length();
    if client_nonce.len() < required || server_nonce.len() < required {
        return Err(UaError::protocol(
            StatusCode::BAD_NONCE_INVALID,
            format!(
                "Nonce lengths {}/{} below required {}",
                client_nonce.len(),
                server_nonce.len(),
                required
            ),
        ));
    }
    Ok(ChannelKeys {
        client: derive(policy, server_nonce, client_nonce)?,
        server: derive(policy, client_nonce, server_nonce)?,
    })
}
