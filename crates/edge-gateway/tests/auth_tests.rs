//! Authentication integration tests.
//!
//! Drives the claims endpoint through a real server with a mocked regional
//! key endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use edge_gateway::auth::headers::{IDENTITY_HEADER, TOKEN_HEADER};
use edge_test_utils::{AlbTokenBuilder, MockKeyServer, TestGateway, TestSigningKey};
use serde_json::Value;

async fn get_me(gateway: &TestGateway, identity: Option<&str>, token: Option<&str>) -> Value {
    let mut request = reqwest::Client::new().get(format!("{}/api/v1/me", gateway.url()));
    if let Some(identity) = identity {
        request = request.header(IDENTITY_HEADER, identity);
    }
    if let Some(token) = token {
        request = request.header(TOKEN_HEADER, token);
    }

    let response = request.send().await.unwrap();
    assert_eq!(response.status(), 200, "claims endpoint never fails the request");
    response.json().await.unwrap()
}

// ============================================================================
// Claims pass-through
// ============================================================================

#[tokio::test]
async fn test_me_returns_claims_for_valid_token() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let token = AlbTokenBuilder::new()
        .for_subject("alice")
        .with_claim("email", "alice@example.com")
        .with_padding()
        .sign(&key);

    let body = get_me(&gateway, Some("alice"), Some(&token)).await;

    assert_eq!(body["sub"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn test_me_is_empty_without_headers() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let gateway = TestGateway::spawn(&keys).await?;

    let body = get_me(&gateway, None, None).await;

    assert_eq!(body, serde_json::json!({}));
    assert_eq!(keys.total_fetches().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_me_is_empty_for_mismatched_identity_header() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);
    let body = get_me(&gateway, Some("mallory"), Some(&token)).await;

    assert_eq!(body, serde_json::json!({}));
    Ok(())
}

#[tokio::test]
async fn test_me_is_empty_for_expired_token() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let token = AlbTokenBuilder::new()
        .for_subject("alice")
        .expires_in(-3600)
        .sign(&key);
    let body = get_me(&gateway, Some("alice"), Some(&token)).await;

    assert_eq!(body, serde_json::json!({}));
    Ok(())
}

#[tokio::test]
async fn test_me_is_empty_when_key_endpoint_fails() -> Result<()> {
    let keys = MockKeyServer::start().await;
    keys.respond_with_status("kid-1", 500).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let key = TestSigningKey::generate("kid-1");
    let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);
    let body = get_me(&gateway, Some("alice"), Some(&token)).await;

    assert_eq!(body, serde_json::json!({}));
    Ok(())
}

// ============================================================================
// Identity binding
// ============================================================================

#[tokio::test]
async fn test_first_subject_binds_container() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let alice = AlbTokenBuilder::new().for_subject("alice").sign(&key);
    let bob = AlbTokenBuilder::new().for_subject("bob").sign(&key);

    let first = get_me(&gateway, Some("alice"), Some(&alice)).await;
    assert_eq!(first["sub"], "alice");

    let record = tokio::fs::read_to_string(gateway.identity_file()).await?;
    assert_eq!(record.trim_end(), "alice");

    // bob's token is genuine but the container belongs to alice
    let second = get_me(&gateway, Some("bob"), Some(&bob)).await;
    assert_eq!(second, serde_json::json!({}));

    let again = get_me(&gateway, Some("alice"), Some(&alice)).await;
    assert_eq!(again["sub"], "alice");
    Ok(())
}

#[tokio::test]
async fn test_pre_bound_subject_rejects_others() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn_with(&keys, &[("BOUND_SUBJECT", "bob")]).await?;

    let alice = AlbTokenBuilder::new().for_subject("alice").sign(&key);
    let body = get_me(&gateway, Some("alice"), Some(&alice)).await;
    assert_eq!(body, serde_json::json!({}));

    let bob = AlbTokenBuilder::new().for_subject("bob").sign(&key);
    let body = get_me(&gateway, Some("bob"), Some(&bob)).await;
    assert_eq!(body["sub"], "bob");

    // A pre-bound container never writes the record
    assert!(!gateway.identity_file().exists());
    Ok(())
}

// ============================================================================
// Key caching across requests
// ============================================================================

#[tokio::test]
async fn test_repeat_requests_fetch_key_once() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway = TestGateway::spawn(&keys).await?;

    let token = AlbTokenBuilder::new().for_subject("alice").sign(&key);
    for _ in 0..3 {
        let body = get_me(&gateway, Some("alice"), Some(&token)).await;
        assert_eq!(body["sub"], "alice");
    }

    assert_eq!(keys.fetch_count("kid-1").await, 1);
    Ok(())
}

#[tokio::test]
async fn test_signer_pinning_over_http() -> Result<()> {
    let keys = MockKeyServer::start().await;
    let key = TestSigningKey::generate("kid-1");
    keys.publish(&key).await;
    let gateway =
        TestGateway::spawn_with(&keys, &[("ALB_SIGNER_ARN", "arn:aws:lb/expected")]).await?;

    let foreign = AlbTokenBuilder::new()
        .for_subject("alice")
        .signer("arn:aws:lb/other")
        .sign(&key);
    let body = get_me(&gateway, Some("alice"), Some(&foreign)).await;
    assert_eq!(body, serde_json::json!({}));

    let pinned = AlbTokenBuilder::new()
        .for_subject("alice")
        .signer("arn:aws:lb/expected")
        .sign(&key);
    let body = get_me(&gateway, Some("alice"), Some(&pinned)).await;
    assert_eq!(body["sub"], "alice");
    Ok(())
}
