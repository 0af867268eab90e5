//! Security layer for the OPC UA binary client
//!
//! Provides the supported security policies, P_SHA256 key derivation,
//! symmetric (HMAC-SHA256 / AES-CBC) and asymmetric (RSA) primitives,
//! certificate handling, the certificate trust provider seam and user
//! identities.

pub mod asymmetric;
pub mod certificate;
pub mod identity;
pub mod keys;
pub mod nonce;
pub mod policy;
pub mod symmetric;
pub mod trust;

pub use asymmetric::{PrivateKey, PublicKey};
pub use certificate::{thumbprint_of, Certificate};
pub use identity::{decrypt_legacy_secret, encrypt_legacy_secret, EncryptedSecret, UserIdentity};
pub use keys::{derive_channel_keys, p_sha256, ChannelKeys};
pub use nonce::generate_nonce;
pub use policy::{MessageSecurityMode, SecurityPolicy};
pub use symmetric::SymmetricKeys;
pub use trust::{CertificateTrustProvider, LocalIdentity, TrustDecision, TrustList};
