//! Integration tests for the WebSocket protocol over a real socket.

use std::time::Duration;

use serde_json::json;

use livefeed_core::types::{EntityId, EntityType};

use crate::helpers::{
    TestServer, connect, eventually, expect_closed, expect_silence, recv_json, send_json,
};

#[tokio::test]
async fn test_entity_specific_subscribers_receive_only_their_entity() {
    let server = TestServer::start().await;
    let alice = server.issue("alice");
    let bob = server.issue("bob");

    let mut a = connect(&server.ws_url(Some(&alice.access_token))).await;
    let mut b = connect(&server.ws_url(Some(&bob.access_token))).await;
    assert_eq!(recv_json(&mut a).await["success"], true);
    assert_eq!(recv_json(&mut b).await["success"], true);

    send_json(
        &mut a,
        json!({"type": "subscribe", "entityType": "orders", "entityId": 42}),
    )
    .await;
    send_json(
        &mut b,
        json!({"type": "subscribe", "entityType": "orders", "entityId": "7"}),
    )
    .await;

    let sub_a = recv_json(&mut a).await;
    assert_eq!(sub_a["type"], "subscription_response");
    assert_eq!(sub_a["success"], true);
    assert_eq!(sub_a["subscription"]["topic"], "orders:42");
    assert_eq!(recv_json(&mut b).await["subscription"]["topic"], "orders:7");

    server
        .engine
        .change_feed()
        .updated(
            EntityType::Order,
            EntityId::from(42),
            json!({"status": "shipped"}),
        )
        .await
        .unwrap();

    let event = recv_json(&mut a).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["entityType"], "orders");
    assert_eq!(event["entityId"], "42");
    assert_eq!(event["eventKind"], "updated");
    assert_eq!(event["data"]["status"], "shipped");
    assert!(event["timestamp"].is_i64());

    expect_silence(&mut a, Duration::from_millis(200)).await;
    expect_silence(&mut b, Duration::from_millis(200)).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_type_wide_subscription_with_filter() {
    let server = TestServer::start().await;
    let pair = server.issue("ops");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;

    send_json(
        &mut ws,
        json!({
            "type": "subscribe",
            "entityType": "deliveries",
            "filter": {"status": "late"},
            "eventKind": "updated"
        }),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["success"], true);

    let feed = server.engine.change_feed();
    feed.updated(EntityType::Delivery, EntityId::from(1), json!({"status": "on_time"}))
        .await
        .unwrap();
    feed.created(EntityType::Delivery, EntityId::from(2), json!({"status": "late"}))
        .await
        .unwrap();
    feed.updated(EntityType::Delivery, EntityId::from(3), json!({"status": "late"}))
        .await
        .unwrap();

    let event = recv_json(&mut ws).await;
    assert_eq!(event["entityId"], "3");
    expect_silence(&mut ws, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_authentication_over_the_socket() {
    let server = TestServer::start().await;
    let mut ws = connect(&server.ws_url(None)).await;

    send_json(&mut ws, json!({"type": "subscribe", "entityType": "orders"})).await;
    let rejected = recv_json(&mut ws).await;
    assert_eq!(rejected["type"], "subscription_response");
    assert_eq!(rejected["success"], false);
    assert_eq!(rejected["error"]["code"], "UNAUTHORIZED");

    send_json(&mut ws, json!({"type": "authenticate", "token": "forged"})).await;
    let failed = recv_json(&mut ws).await;
    assert_eq!(failed["type"], "auth_response");
    assert_eq!(failed["success"], false);

    let pair = server.issue("carol");
    send_json(
        &mut ws,
        json!({"type": "authenticate", "token": pair.access_token}),
    )
    .await;
    assert_eq!(recv_json(&mut ws).await["success"], true);

    send_json(&mut ws, json!({"type": "subscribe", "entityType": "orders"})).await;
    assert_eq!(recv_json(&mut ws).await["success"], true);
}

#[tokio::test]
async fn test_invalid_input_keeps_connection_open() {
    let server = TestServer::start().await;
    let pair = server.issue("dave");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;

    send_json(&mut ws, json!({"type": "subscribe", "entityType": "spaceships"})).await;
    let unknown = recv_json(&mut ws).await;
    assert_eq!(unknown["success"], false);
    assert_eq!(unknown["error"]["code"], "INVALID_INPUT");

    send_json(&mut ws, json!({"type": "launch"})).await;
    let malformed = recv_json(&mut ws).await;
    assert_eq!(malformed["type"], "error");
    assert_eq!(malformed["code"], "INVALID_INPUT");

    send_json(&mut ws, json!({"type": "ping"})).await;
    let pong = recv_json(&mut ws).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].is_i64());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let server = TestServer::start().await;
    let pair = server.issue("erin");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;

    send_json(&mut ws, json!({"type": "subscribe", "entityType": "products"})).await;
    recv_json(&mut ws).await;
    send_json(&mut ws, json!({"type": "unsubscribe", "entityType": "products"})).await;
    let response = recv_json(&mut ws).await;
    assert_eq!(response["type"], "unsubscription_response");
    assert_eq!(response["success"], true);

    let matched = server.engine.dispatcher.dispatch(
        &livefeed_core::events::ChangeEvent::created(
            EntityType::Product,
            EntityId::from(5),
            json!({}),
        ),
    );
    assert!(matched.is_empty());
    expect_silence(&mut ws, Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_peer_disconnect_purges_subscriptions() {
    let server = TestServer::start().await;
    let pair = server.issue("frank");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;
    send_json(&mut ws, json!({"type": "subscribe", "entityType": "coupons"})).await;
    recv_json(&mut ws).await;
    assert_eq!(server.engine.subscriptions.topic_count(), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    let engine = server.engine.clone();
    assert!(
        eventually(|| {
            engine.connections.connection_count() == 0 && engine.subscriptions.topic_count() == 0
        })
        .await
    );
    assert!(engine.subscriptions.verify_consistency().is_ok());
}

#[tokio::test]
async fn test_sign_out_closes_sockets_and_revokes_tokens() {
    let server = TestServer::start().await;
    let pair = server.issue("grace");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;

    let (revoked, closed) = server.engine.sign_out("grace");
    assert_eq!((revoked, closed), (1, 1));
    expect_closed(&mut ws).await;

    let (status, _) = server
        .request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refreshToken": pair.refresh_token})),
        )
        .await;
    assert_eq!(status, http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_shutdown_closes_open_sockets() {
    let server = TestServer::start().await;
    let pair = server.issue("heidi");
    let mut ws = connect(&server.ws_url(Some(&pair.access_token))).await;
    recv_json(&mut ws).await;

    server.shutdown().await;
    expect_closed(&mut ws).await;
}
