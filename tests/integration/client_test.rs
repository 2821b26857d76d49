//! Integration tests for the resilient client against a real server.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use livefeed_client::{ClientConfig, ClientState, LiveFeedClient, ReconnectPolicy, Topic};
use livefeed_core::protocol::OutboundMessage;
use livefeed_core::types::{EntityId, EntityType};

use crate::helpers::{TestServer, WAIT, eventually};

/// Next change event, skipping handshake responses.
async fn next_event(events: &mut mpsc::Receiver<OutboundMessage>) -> OutboundMessage {
    loop {
        let message = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("event within timeout")
            .expect("client open");
        if matches!(message, OutboundMessage::Event { .. }) {
            return message;
        }
    }
}

fn client_config(url: String) -> ClientConfig {
    ClientConfig::new(url).with_reconnect(ReconnectPolicy::new(
        Duration::from_millis(20),
        Duration::from_millis(200),
        10,
    ))
}

#[tokio::test]
async fn test_client_receives_subscribed_events() {
    let server = TestServer::start().await;
    let pair = server.issue("olivia");

    let (client, mut events) = LiveFeedClient::connect(client_config(server.ws_url(None)));
    client.authenticate(pair.access_token).unwrap();
    client
        .subscribe(Topic::entity(EntityType::Payment, EntityId::from(9)))
        .unwrap();
    assert!(client.wait_for_state(ClientState::Open, WAIT).await);

    let engine = server.engine.clone();
    assert!(
        eventually(|| {
            engine
                .subscriptions
                .subscribers_of(EntityType::Payment, Some(&EntityId::from(9)))
                .len()
                == 1
        })
        .await
    );

    server
        .engine
        .change_feed()
        .updated(
            EntityType::Payment,
            EntityId::from(9),
            json!({"state": "captured"}),
        )
        .await
        .unwrap();

    match next_event(&mut events).await {
        OutboundMessage::Event {
            entity_type,
            entity_id,
            data,
            ..
        } => {
            assert_eq!(entity_type, EntityType::Payment);
            assert_eq!(entity_id, EntityId::from(9));
            assert_eq!(data["state"], "captured");
        }
        other => panic!("unexpected message: {other:?}"),
    }

    client.disconnect().await;
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test]
async fn test_client_resubscribes_after_server_drops_it() {
    let server = TestServer::start().await;
    let pair = server.issue("peggy");

    let (client, mut events) = LiveFeedClient::connect(client_config(server.ws_url(None)));
    client.authenticate(pair.access_token).unwrap();
    client.subscribe(Topic::entity_type(EntityType::Inventory)).unwrap();

    let engine = server.engine.clone();
    let subscribed = || {
        engine
            .subscriptions
            .subscribers_of(EntityType::Inventory, None)
            .len()
            == 1
    };
    assert!(eventually(subscribed).await);

    assert_eq!(server.engine.connections.terminate_subject("peggy"), 1);
    assert!(
        engine
            .subscriptions
            .subscribers_of(EntityType::Inventory, None)
            .is_empty()
    );

    // The client dials back in, re-authenticates and replays its topics.
    assert!(eventually(subscribed).await);
    assert!(client.wait_for_state(ClientState::Open, WAIT).await);

    server
        .engine
        .change_feed()
        .created(EntityType::Inventory, EntityId::from(3), json!({"onHand": 12}))
        .await
        .unwrap();

    match next_event(&mut events).await {
        OutboundMessage::Event { data, .. } => assert_eq!(data["onHand"], 12),
        other => panic!("unexpected message: {other:?}"),
    }
    assert_eq!(client.topics().len(), 1);

    client.disconnect().await;
}

#[tokio::test]
async fn test_client_gives_up_when_server_is_gone() {
    let server = TestServer::start().await;
    let url = server.ws_url(None);
    server.shutdown().await;

    let config = ClientConfig::new(url)
        .with_reconnect(ReconnectPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(20),
            2,
        ))
        .with_connect_timeout(Duration::from_millis(500));
    let (client, _events) = LiveFeedClient::connect(config);

    assert!(client.wait_for_state(ClientState::Failed, WAIT).await);
    client.disconnect().await;
}
