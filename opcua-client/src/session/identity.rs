//! Identity tokens for ActivateSession

use opcua_binary::ExtensionObjectExt;
use opcua_core::{ExtensionObject, StatusCode, UaError, UaResult, UaString};
use opcua_security::{encrypt_legacy_secret, Certificate, SecurityPolicy, UserIdentity};
use opcua_services::{
    AnonymousIdentityToken, EndpointDescription, SignatureData, UserNameIdentityToken, UserTokenType,
    X509IdentityToken,
};

/// Policy id used when the endpoint lists no user token policies
fn default_policy_id(token_type: UserTokenType) -> &'static str {
    match token_type {
        UserTokenType::Anonymous => "anonymous",
        UserTokenType::UserName => "username",
        UserTokenType::Certificate => "certificate",
        UserTokenType::IssuedToken => "issued",
    }
}

/// Policy id and security policy for a token type offered by the endpoint
///
/// The token policy's own security policy wins; without one the channel's
/// policy applies.
fn token_policy(
    endpoint: &EndpointDescription,
    token_type: UserTokenType,
    channel_policy: SecurityPolicy,
) -> UaResult<(UaString, SecurityPolicy)> {
    if endpoint.user_identity_tokens.is_empty() {
        return Ok((UaString::from(default_policy_id(token_type)), channel_policy));
    }
    let policy = endpoint.find_user_token(token_type).ok_or_else(|| {
        log::error!("Endpoint {} offers no {:?} token policy", endpoint.endpoint_url, token_type);
        UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_INVALID)
    })?;
    let security = match policy.security_policy_uri.as_str() {
        Some(uri) if !uri.is_empty() => SecurityPolicy::from_uri(uri)
            .map_err(|_| UaError::IdentityTokenRejected(StatusCode::BAD_IDENTITY_TOKEN_INVALID))?,
        _ => channel_policy,
    };
    Ok((policy.policy_id.clone(), security))
}

/// Identity token and user token signature for `identity`
///
/// `server_certificate` and `server_nonce` come from the latest
/// CreateSession or ActivateSession response.
pub(super) fn identity_token(
    identity: &UserIdentity,
    endpoint: &EndpointDescription,
    channel_policy: SecurityPolicy,
    server_certificate: Option<&Certificate>,
    server_nonce: &[u8],
) -> UaResult<(ExtensionObject, SignatureData)> {
    match identity {
        UserIdentity::Anonymous => {
            let (policy_id, _) = token_policy(endpoint, UserTokenType::Anonymous, channel_policy)?;
            let token = AnonymousIdentityToken { policy_id };
            Ok((ExtensionObject::from_structure(&token)?, SignatureData::default()))
        }
        UserIdentity::UserName { user, password } => {
            let (policy_id, security) = token_policy(endpoint, UserTokenType::UserName, channel_policy)?;
            let server_key = server_certificate.map(Certificate::public_key).transpose()?;
            let secret = encrypt_legacy_secret(security, password.as_bytes(), server_nonce, server_key.as_ref())?;
            if secret.algorithm.is_none() {
                log::warn!("Sending password of {} unencrypted", user);
            }
            let token = UserNameIdentityToken {
                policy_id,
                user_name: UaString::from(user.as_str()),
                password: secret.data.into(),
                encryption_algorithm: secret.algorithm.map(UaString::from).unwrap_or_default(),
            };
            Ok((ExtensionObject::from_structure(&token)?, SignatureData::default()))
        }
        UserIdentity::X509 {
            certificate,
            private_key,
        } => {
            let (policy_id, security) = token_policy(endpoint, UserTokenType::Certificate, channel_policy)?;
            let security = if security.is_none() {
                SecurityPolicy::Basic256Sha256
            } else {
                security
            };
            let mut data = server_certificate.map(|c| c.as_der().to_vec()).unwrap_or_default();
            data.extend_from_slice(server_nonce);
            let signature = SignatureData::new(security.asymmetric_signature_algorithm(), private_key.sign_sha256(&data)?);
            let token = X509IdentityToken {
                policy_id,
                certificate_data: certificate.to_byte_string(),
            };
            Ok((ExtensionObject::from_structure(&token)?, signature))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_binary::{DecodingOptions, Structure};
    use opcua_core::ByteString;
    use opcua_services::{ApplicationDescription, SecurityMode, UserTokenPolicy};

    fn endpoint(tokens: Vec<UserTokenPolicy>) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: UaString::from("opc.tcp://fake:4840"),
            server: ApplicationDescription::client("urn:fake", "urn:fake", "Fake"),
            server_certificate: ByteString::null(),
            security_mode: SecurityMode::None,
            security_policy_uri: UaString::from(SecurityPolicy::None.uri()),
            user_identity_tokens: tokens,
            transport_profile_uri: UaString::null(),
            security_level: 0,
        }
    }

    #[test]
    fn test_anonymous_uses_endpoint_policy_id() {
        let endpoint = endpoint(vec![UserTokenPolicy::new("anon-1", UserTokenType::Anonymous, None)]);
        let (token, signature) =
            identity_token(&UserIdentity::Anonymous, &endpoint, SecurityPolicy::None, None, &[]).unwrap();
        assert!(signature.is_null());
        assert_eq!(token.node_id, AnonymousIdentityToken::BINARY_ENCODING_ID);
        let token: AnonymousIdentityToken = token.decode_structure(DecodingOptions::default()).unwrap();
        assert_eq!(token.policy_id, UaString::from("anon-1"));
    }

    #[test]
    fn test_missing_token_policy_is_rejected() {
        let endpoint = endpoint(vec![UserTokenPolicy::new("user", UserTokenType::UserName, None)]);
        let err = identity_token(&UserIdentity::Anonymous, &endpoint, SecurityPolicy::None, None, &[]).unwrap_err();
        assert!(matches!(
            err,
            UaError::IdentityTokenRejected(s) if s == StatusCode::BAD_IDENTITY_TOKEN_INVALID
        ));
    }

    #[test]
    fn test_user_name_in_clear_without_security() {
        let identity = UserIdentity::user_name("operator", "secret");
        let (token, _) = identity_token(&identity, &endpoint(Vec::new()), SecurityPolicy::None, None, &[]).unwrap();
        let token: UserNameIdentityToken = token.decode_structure(DecodingOptions::default()).unwrap();
        assert_eq!(token.policy_id, UaString::from("username"));
        assert_eq!(token.password.as_slice(), b"secret");
        assert!(token.encryption_algorithm.is_null());
    }

    #[test]
    fn test_secured_user_name_needs_server_certificate() {
        let endpoint = endpoint(vec![UserTokenPolicy::new(
            "user",
            UserTokenType::UserName,
            Some(SecurityPolicy::Basic256Sha256.uri()),
        )]);
        let identity = UserIdentity::user_name("operator", "secret");
        let err = identity_token(&identity, &endpoint, SecurityPolicy::None, None, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, UaError::IdentityTokenRejected(_)));
    }
}
