mod common;

use common::{FakeServer, node};
use mockall::mock;
use opcua_client::{ChannelState, SessionState};
use opcua_core::{ByteString, StatusCode, UaError, UaString, Variant};
use opcua_security::{Certificate, CertificateTrustProvider, LocalIdentity, SecurityPolicy, TrustDecision, UserIdentity};
use opcua_services::SecurityMode;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Self-signed RSA certificate of the fake server
const SERVER_CERTIFICATE: &[u8] = include_bytes!("fixtures/server_cert.der");

mock! {
    TrustProvider {}

    impl CertificateTrustProvider for TrustProvider {
        fn local_identity(&self, application_uri: &str) -> Option<LocalIdentity>;
        fn validate_remote(&self, certificate: &Certificate) -> TrustDecision;
    }
}

#[tokio::test]
async fn test_open_read_close() -> anyhow::Result<()> {
    let server = FakeServer::start();
    server.set_value("Temperature", Variant::Double(21.5));
    let session = server.client().build()?;

    session.open().await?;
    assert_eq!(session.state(), SessionState::Active);
    let info = session.info().expect("session info");
    assert!(!info.authentication_token.is_null());

    let values = session.read(&[node("Temperature"), node("Nowhere")]).await?;
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].value, Some(Variant::Double(21.5)));
    assert_eq!(values[1].status(), StatusCode::BAD_NODE_ID_UNKNOWN);

    assert_ok!(session.close(true).await);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.channel().state(), ChannelState::Closed);
    assert!(session.info().is_none());
    assert_eq!(server.request_count("CloseSession"), 1);
    assert_eq!(server.session_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let session = server.client().build()?;

    assert_ok!(session.close(false).await);
    session.open().await?;
    assert_ok!(session.close(false).await);
    assert_ok!(session.close(false).await);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(server.request_count("CloseSession"), 1);

    let err = assert_err!(session.read(&[node("Temperature")]).await);
    assert!(matches!(err, UaError::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn test_open_active_session_is_noop() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let session = server.client().build()?;
    session.open().await?;
    session.open().await?;
    assert_eq!(server.request_count("CreateSession"), 1);
    Ok(())
}

#[tokio::test]
async fn test_rejected_user_faults_session() -> anyhow::Result<()> {
    let server = FakeServer::start();
    server.reject_user("intruder");
    let session = server
        .client()
        .identity(UserIdentity::user_name("intruder", "guess"))
        .build()?;

    let err = assert_err!(session.open().await);
    assert!(matches!(
        err,
        UaError::IdentityTokenRejected(status) if status == StatusCode::BAD_USER_ACCESS_DENIED
    ));
    assert!(!err.is_retriable());
    assert_eq!(session.state(), SessionState::Faulted);

    assert_ok!(session.close(false).await);
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_user_name_identity_is_accepted() -> anyhow::Result<()> {
    let server = FakeServer::start();
    server.reject_user("intruder");
    let session = server
        .client()
        .identity(UserIdentity::user_name("operator", "secret"))
        .build()?;
    session.open().await?;
    assert_eq!(session.state(), SessionState::Active);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server() -> anyhow::Result<()> {
    let server = FakeServer::start();
    server.connector.set_refuse(true);
    let session = server.client().build()?;

    let err = assert_err!(session.open().await);
    assert!(matches!(err, UaError::Connection(_)));
    assert!(err.is_retriable());
    assert_eq!(session.state(), SessionState::Faulted);

    server.connector.set_refuse(false);
    session.open().await?;
    assert_eq!(session.state(), SessionState::Active);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_reactivates_known_session() -> anyhow::Result<()> {
    let server = FakeServer::start();
    server.set_value("Temperature", Variant::Double(3.0));
    let session = server.client().build()?;
    session.open().await?;
    let first_channel = session.channel().channel_id().await;

    server.drop_connections();
    let mut channel_state = session.channel().watch_state();
    assert_ok!(channel_state.wait_for(|s| *s == ChannelState::Faulted).await);
    let err = assert_err!(session.read(&[node("Temperature")]).await);
    assert!(matches!(err, UaError::ChannelAborted(_)));

    session.reconnect().await?;
    assert_eq!(session.state(), SessionState::Active);
    assert_ne!(session.channel().channel_id().await, first_channel);
    assert_eq!(server.request_count("CreateSession"), 1);
    assert_eq!(server.request_count("ActivateSession"), 2);

    let values = session.read(&[node("Temperature")]).await?;
    assert_eq!(values[0].value, Some(Variant::Double(3.0)));
    Ok(())
}

#[tokio::test]
async fn test_reconnect_requires_open_session() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let session = server.client().build()?;
    let err = assert_err!(session.reconnect().await);
    assert!(matches!(err, UaError::InvalidState(_)));
    Ok(())
}

#[tokio::test]
async fn test_unsecured_endpoint_skips_trust_provider() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let mut provider = MockTrustProvider::new();
    provider.expect_validate_remote().never();
    provider.expect_local_identity().never();
    let session = server.client().trust_provider(Arc::new(provider)).build()?;
    session.open().await?;
    assert_eq!(session.channel().security_policy(), SecurityPolicy::None);
    Ok(())
}

#[tokio::test]
async fn test_invalid_server_certificate_fails_before_trust_check() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let mut provider = MockTrustProvider::new();
    provider.expect_validate_remote().never();
    provider.expect_local_identity().never();

    let mut endpoint = common::endpoint();
    endpoint.security_policy_uri = UaString::from(SecurityPolicy::Basic256Sha256.uri());
    endpoint.security_mode = SecurityMode::SignAndEncrypt;
    endpoint.server_certificate = ByteString::from(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
    let session = server
        .client()
        .endpoint(endpoint)
        .trust_provider(Arc::new(provider))
        .build()?;

    let err = assert_err!(session.open().await);
    assert_eq!(err.status_code(), StatusCode::BAD_CERTIFICATE_INVALID);
    assert_eq!(session.state(), SessionState::Faulted);
    assert_eq!(server.request_count("CreateSession"), 0);
    Ok(())
}

#[tokio::test]
async fn test_rejected_server_certificate_fails_open() -> anyhow::Result<()> {
    let server = FakeServer::start();
    let mut provider = MockTrustProvider::new();
    provider
        .expect_validate_remote()
        .withf(|certificate| certificate.as_der() == SERVER_CERTIFICATE)
        .times(1)
        .return_const(TrustDecision::Rejected(StatusCode::BAD_CERTIFICATE_UNTRUSTED));
    provider.expect_local_identity().never();

    let mut endpoint = common::endpoint();
    endpoint.security_policy_uri = UaString::from(SecurityPolicy::Basic256Sha256.uri());
    endpoint.security_mode = SecurityMode::SignAndEncrypt;
    endpoint.server_certificate = ByteString::from(SERVER_CERTIFICATE.to_vec());
    let session = server
        .client()
        .endpoint(endpoint)
        .trust_provider(Arc::new(provider))
        .build()?;

    let err = assert_err!(session.open().await);
    assert!(matches!(err, UaError::SecurityChecksFailed(_)), "unexpected {:?}", err);
    assert!(!err.is_retriable());
    assert_eq!(session.state(), SessionState::Faulted);
    assert_eq!(session.channel().state(), ChannelState::Faulted);
    assert_eq!(server.request_count("CreateSession"), 0);
    Ok(())
}
