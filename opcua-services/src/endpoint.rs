//! Endpoint and application descriptions, signatures

use crate::enums::{ApplicationType, SecurityMode, UserTokenType};
use opcua_binary::{impl_encodable_struct, impl_structure};
use opcua_core::{ByteString, LocalizedText, UaString};

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDescription {
    pub application_uri: UaString,
    pub product_uri: UaString,
    pub application_name: LocalizedText,
    pub application_type: ApplicationType,
    pub gateway_server_uri: UaString,
    pub discovery_profile_uri: UaString,
    pub discovery_urls: Vec<UaString>,
}

impl_encodable_struct!(ApplicationDescription {
    application_uri,
    product_uri,
    application_name,
    application_type,
    gateway_server_uri,
    discovery_profile_uri,
    discovery_urls,
});
impl_structure!(ApplicationDescription, 308, 310);

impl ApplicationDescription {
    /// Description of a client application
    pub fn client(application_uri: &str, product_uri: &str, application_name: &str) -> Self {
        Self {
            application_uri: UaString::from(application_uri),
            product_uri: UaString::from(product_uri),
            application_name: LocalizedText::text(application_name),
            application_type: ApplicationType::Client,
            gateway_server_uri: UaString::null(),
            discovery_profile_uri: UaString::null(),
            discovery_urls: Vec::new(),
        }
    }
}

/// A user identity token the server accepts on an endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct UserTokenPolicy {
    pub policy_id: UaString,
    pub token_type: UserTokenType,
    pub issued_token_type: UaString,
    pub issuer_endpoint_url: UaString,
    /// Policy securing the token, null or empty for the channel's policy
    pub security_policy_uri: UaString,
}

impl_encodable_struct!(UserTokenPolicy {
    policy_id,
    token_type,
    issued_token_type,
    issuer_endpoint_url,
    security_policy_uri,
});
impl_structure!(UserTokenPolicy, 304, 306);

impl UserTokenPolicy {
    pub fn new(policy_id: &str, token_type: UserTokenType, security_policy_uri: Option<&str>) -> Self {
        Self {
            policy_id: UaString::from(policy_id),
            token_type,
            issued_token_type: UaString::null(),
            issuer_endpoint_url: UaString::null(),
            security_policy_uri: security_policy_uri.map(UaString::from).unwrap_or_default(),
        }
    }
}

/// An endpoint of a server as returned by discovery or CreateSession
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescription {
    pub endpoint_url: UaString,
    pub server: ApplicationDescription,
    /// DER certificate of the server
    pub server_certificate: ByteString,
    pub security_mode: SecurityMode,
    pub security_policy_uri: UaString,
    pub user_identity_tokens: Vec<UserTokenPolicy>,
    pub transport_profile_uri: UaString,
    pub security_level: u8,
}

impl_encodable_struct!(EndpointDescription {
    endpoint_url,
    server,
    server_certificate,
    security_mode,
    security_policy_uri,
    user_identity_tokens,
    transport_profile_uri,
    security_level,
});
impl_structure!(EndpointDescription, 312, 314);

/// Transport profile of UA-TCP with the binary encoding
pub const UATCP_BINARY_PROFILE: &str = "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

impl EndpointDescription {
    /// First user token policy of the given type
    pub fn find_user_token(&self, token_type: UserTokenType) -> Option<&UserTokenPolicy> {
        self.user_identity_tokens.iter().find(|p| p.token_type == token_type)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureData {
    pub algorithm: UaString,
    pub signature: ByteString,
}

impl_encodable_struct!(SignatureData { algorithm, signature });

impl SignatureData {
    pub fn new(algorithm: &str, signature: Vec<u8>) -> Self {
        Self {
            algorithm: UaString::from(algorithm),
            signature: ByteString::from(signature),
        }
    }

    pub fn is_null(&self) -> bool {
        self.signature.is_null() || self.signature.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignedSoftwareCertificate {
    pub certificate_data: ByteString,
    pub signature: ByteString,
}

impl_encodable_struct!(SignedSoftwareCertificate {
    certificate_data,
    signature,
});

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_binary::{decode_exact, encode_to_vec, DecodingOptions};

    #[test]
    fn test_endpoint_round_trip() {
        let endpoint = EndpointDescription {
            endpoint_url: UaString::from("opc.tcp://plc:4840"),
            server: ApplicationDescription {
                application_type: ApplicationType::Server,
                ..ApplicationDescription::client("urn:plc", "urn:vendor", "PLC")
            },
            server_certificate: ByteString::from(vec![0x30, 0x82]),
            security_mode: SecurityMode::SignAndEncrypt,
            security_policy_uri: UaString::from("http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256"),
            user_identity_tokens: vec![
                UserTokenPolicy::new("anon", UserTokenType::Anonymous, None),
                UserTokenPolicy::new("user", UserTokenType::UserName, None),
            ],
            transport_profile_uri: UaString::from(UATCP_BINARY_PROFILE),
            security_level: 3,
        };
        let bytes = encode_to_vec(&endpoint).unwrap();
        let decoded: EndpointDescription = decode_exact(&bytes, DecodingOptions::default()).unwrap();
        assert_eq!(decoded, endpoint);
        assert_eq!(
            decoded.find_user_token(UserTokenType::UserName).map(|p| p.policy_id.as_ref_or_empty()),
            Some("user")
        );
        assert!(decoded.find_user_token(UserTokenType::Certificate).is_none());
    }
}
