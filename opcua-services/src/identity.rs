//! User identity tokens carried in ActivateSession

use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{ByteString, UaString};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnonymousIdentityToken {
    pub policy_id: UaString,
}

impl_encodable_struct!(AnonymousIdentityToken { policy_id });
impl_structure!(AnonymousIdentityToken, 319, 321);

/// User name and password, the password possibly encrypted
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserNameIdentityToken {
    pub policy_id: UaString,
    pub user_name: UaString,
    pub password: ByteString,
    /// Asymmetric encryption algorithm URI, null for plaintext
    pub encryption_algorithm: UaString,
}

impl_encodable_struct!(UserNameIdentityToken {
    policy_id,
    user_name,
    password,
    encryption_algorithm,
});
impl_structure!(UserNameIdentityToken, 322, 324);

#[derive(Debug, Clone, PartialEq, Default)]
pub struct X509IdentityToken {
    pub policy_id: UaString,
    /// DER certificate of the user
    pub certificate_data: ByteString,
}

impl_encodable_struct!(X509IdentityToken {
    policy_id,
    certificate_data,
});
impl_structure!(X509IdentityToken, 325, 327);
