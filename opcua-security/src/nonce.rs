//! Random nonces

use opcua_core::{UaError, UaResult};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate `length` cryptographically random bytes
pub fn generate_nonce(length: usize) -> UaResult<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut nonce = vec![0u8; length];
    rng.fill(&mut nonce)
        .map_err(|_| UaError::SecurityChecksFailed("Failed to generate nonce".to_string()))?;
    Ok(nonce)
}
