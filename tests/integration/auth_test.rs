//! Integration tests for the token endpoints.

use http::StatusCode;
use serde_json::json;

use livefeed_auth::TokenError;

use crate::helpers::{TestServer, connect, recv_json};

#[tokio::test]
async fn test_refreshed_access_token_authenticates_socket() {
    let server = TestServer::start().await;
    let pair = server.issue("ivan");

    let (status, body) = server
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refreshToken": pair.refresh_token})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["accessToken"].as_str().unwrap().to_string();
    assert_ne!(body["refreshToken"], json!(pair.refresh_token));

    let mut ws = connect(&server.ws_url(Some(&access))).await;
    let auth = recv_json(&mut ws).await;
    assert_eq!(auth["type"], "auth_response");
    assert_eq!(auth["success"], true);
}

#[tokio::test]
async fn test_rotated_token_cannot_be_replayed() {
    let server = TestServer::start().await;
    let pair = server.issue("judy");
    let body = json!({"refreshToken": pair.refresh_token});

    let (first, _) = server
        .request("POST", "/api/auth/refresh", Some(body.clone()))
        .await;
    assert_eq!(first, StatusCode::OK);

    let (replay, error) = server
        .request("POST", "/api/auth/refresh", Some(body))
        .await;
    assert_eq!(replay, StatusCode::UNAUTHORIZED);
    assert_eq!(error["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_revoke_all_invalidates_every_refresh_token() {
    let server = TestServer::start().await;
    let first = server.issue("mallory");
    let second = server.issue("mallory");

    assert_eq!(server.engine.tokens.revoke_all("mallory"), 2);
    assert!(matches!(
        server.engine.tokens.rotate(&first.refresh_token),
        Err(TokenError::Revoked)
    ));

    let (status, _) = server
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refreshToken": second.refresh_token})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_rejected_as_access_token() {
    let server = TestServer::start().await;
    let pair = server.issue("niaj");

    let mut ws = connect(&server.ws_url(Some(&pair.refresh_token))).await;
    let auth = recv_json(&mut ws).await;
    assert_eq!(auth["type"], "auth_response");
    assert_eq!(auth["success"], false);
    assert_eq!(auth["message"], "Authentication failed");
}
