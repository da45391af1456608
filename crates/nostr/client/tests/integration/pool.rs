//! Relay membership tests

use super::*;
use nostr::EventFilter;
use nostr_client::{ClientError, Policy, SimplePolicy};

#[tokio::test]
async fn test_add_relay_normalizes_url() {
    let (pool, transport) = mock_pool();

    pool.add_relay("A.Example.com/", None).await.unwrap();

    assert_eq!(pool.relay_urls().await, vec![RELAY_A]);
    assert_eq!(transport.dial_count(RELAY_A), 1);
    assert!(pool.is_connected(RELAY_A).await);
    assert!(pool.is_connected("wss://a.example.com/").await);
    assert_eq!(pool.policy(RELAY_A).await, Some(Policy::read_write()));
    assert_eq!(pool.connected_count().await, 1);
}

#[tokio::test]
async fn test_add_relay_refused() {
    let (pool, transport) = mock_pool();
    transport.refuse(RELAY_A);

    let result = pool.add_relay(RELAY_A, None).await;
    match result {
        Err(ClientError::ConnectFailed { url, source }) => {
            assert_eq!(url, RELAY_A);
            assert_eq!(
                source,
                TransportError::WebSocket("connection refused".to_string())
            );
        }
        other => panic!("Expected ConnectFailed, got {:?}", other),
    }
    assert!(pool.relay_urls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_add_relay_times_out() {
    let config = PoolConfig {
        connect_timeout_secs: 1,
        ..Default::default()
    };
    let (pool, transport) = mock_pool_with_config(config);
    transport.stall(RELAY_A);

    let result = pool.add_relay(RELAY_A, None).await;
    assert!(matches!(
        result,
        Err(ClientError::ConnectFailed {
            source: TransportError::Timeout(_),
            ..
        })
    ));
    assert!(pool.relay_urls().await.is_empty());
}

#[tokio::test]
async fn test_remove_relay_closes_subscriptions_and_connection() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();

    let sub = pool.subscribe(EventFilter::new().kinds([1])).await;
    assert_eq!(sub.relays().await, vec![RELAY_A, RELAY_B]);

    pool.remove_relay(RELAY_A).await;

    let relay_a = transport.relay(RELAY_A);
    assert_eq!(relay_a.closed_ids(), vec![sub.id().to_string()]);
    assert!(relay_a.is_closed());
    assert_eq!(pool.relay_urls().await, vec![RELAY_B]);
    assert_eq!(sub.relays().await, vec![RELAY_B]);
    assert!(transport.relay(RELAY_B).closed_ids().is_empty());
}

#[tokio::test]
async fn test_readd_replaces_connection() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    let sub = pool.subscribe(EventFilter::new()).await;
    let first = transport.relay(RELAY_A);

    pool.add_relay(RELAY_A, Some(Policy::write_only())).await.unwrap();
    let second = transport.relay(RELAY_A);

    assert_eq!(transport.dial_count(RELAY_A), 2);
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(pool.relay_urls().await, vec![RELAY_A]);
    assert_eq!(pool.policy(RELAY_A).await, Some(Policy::write_only()));

    // The replacement joins the open subscription
    assert_eq!(second.requested_ids(), vec![sub.id().to_string()]);
    assert_eq!(sub.relays().await, vec![RELAY_A]);
}

#[tokio::test]
async fn test_read_failure_marks_relay_disconnected() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();

    transport
        .relay(RELAY_A)
        .push_error(TransportError::WebSocket("connection reset".to_string()));

    wait_for_state(&pool, RELAY_A, ConnectionState::Disconnected).await;
    // A dead relay stays in the pool until removed
    assert_eq!(pool.relay_urls().await, vec![RELAY_A, RELAY_B]);
    assert_eq!(pool.connected_count().await, 1);
    assert!(!pool.is_connected(RELAY_A).await);

    pool.remove_relay(RELAY_A).await;
    assert_eq!(pool.relay_urls().await, vec![RELAY_B]);
}

#[tokio::test]
async fn test_connect_configured_reports_each_relay() {
    let config = PoolConfig::default()
        .with_relay(RELAY_A, Policy::read_write())
        .with_relay(RELAY_B, Policy::read_only());
    let (pool, transport) = mock_pool_with_config(config);
    transport.refuse(RELAY_B);

    let results = pool.connect_configured().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, RELAY_A);
    assert!(results[0].1.is_ok());
    assert_eq!(results[1].0, RELAY_B);
    assert!(matches!(results[1].1, Err(ClientError::ConnectFailed { .. })));
    assert_eq!(pool.relay_urls().await, vec![RELAY_A]);
}

#[tokio::test]
async fn test_disconnect_all() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();
    let sub = pool.subscribe(EventFilter::new()).await;

    pool.disconnect_all().await;

    assert!(pool.relay_urls().await.is_empty());
    assert!(transport.relay(RELAY_A).is_closed());
    assert!(transport.relay(RELAY_B).is_closed());
    // The subscription survives with no relays
    assert_eq!(pool.subscription_ids().await, vec![sub.id().to_string()]);
    assert!(sub.relays().await.is_empty());
}

#[tokio::test]
async fn test_set_policy_follows_overrides() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, Some(Policy::write_only())).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();

    let feed = pool
        .subscribe_with_id("feed", EventFilter::new().kinds([1]))
        .await
        .unwrap();
    let dms = pool
        .subscribe_with_id("dms", EventFilter::new().kinds([4]))
        .await
        .unwrap();
    assert_eq!(feed.relays().await, vec![RELAY_B]);

    let allow = SimplePolicy {
        read: true,
        write: true,
    };
    let deny = SimplePolicy {
        read: false,
        write: true,
    };

    // A joins "feed" through an override
    assert!(pool.set_policy(RELAY_A, Policy::write_only().with_override("feed", allow)).await);
    let relay_a = transport.relay(RELAY_A);
    assert_eq!(relay_a.requested_ids(), vec!["feed"]);
    assert_eq!(feed.relays().await, vec![RELAY_A, RELAY_B]);
    assert_eq!(dms.relays().await, vec![RELAY_B]);

    // B leaves "dms" through an override; "feed" is untouched
    assert!(pool.set_policy(RELAY_B, Policy::read_write().with_override("dms", deny)).await);
    let relay_b = transport.relay(RELAY_B);
    assert_eq!(relay_b.closed_ids(), vec!["dms"]);
    assert!(dms.relays().await.is_empty());
    assert_eq!(feed.relays().await, vec![RELAY_A, RELAY_B]);

    // Without overrides nothing changes for open subscriptions
    assert!(pool.set_policy(RELAY_A, Policy::write_only()).await);
    assert_eq!(feed.relays().await, vec![RELAY_A, RELAY_B]);
    assert_eq!(pool.policy(RELAY_A).await, Some(Policy::write_only()));
}

#[tokio::test]
async fn test_add_then_remove_leaves_pool_empty() {
    let (pool, transport) = mock_pool();

    for url in ["a.example.com", "ws://127.0.0.1:7000", "https://b.example.com/"] {
        pool.add_relay(url, None).await.unwrap();
        pool.remove_relay(url).await;
        assert!(pool.relay_urls().await.is_empty());
        assert!(pool.states().await.is_empty());
    }
    assert!(transport.relay(RELAY_B).is_closed());

    // Removing again is a no-op
    pool.remove_relay(RELAY_B).await;
    assert!(pool.relay_urls().await.is_empty());
}
