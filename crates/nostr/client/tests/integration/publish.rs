//! Publish fan-out tests

use super::*;
use nostr::EventFilter;
use nostr_client::{
    ClientError, PUBLISH_OBSERVATION_WINDOW, Policy, PublishState, PublishStatus,
};

async fn collect_statuses(
    mut statuses: tokio::sync::mpsc::Receiver<PublishStatus>,
) -> Vec<PublishStatus> {
    let mut collected = Vec::new();
    while let Some(status) = statuses.recv().await {
        collected.push(status);
    }
    collected.sort_by(|a, b| a.relay.cmp(&b.relay));
    collected
}

#[tokio::test(start_paused = true)]
async fn test_publish_fans_out_to_writable_relays() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, Some(Policy::read_only())).await.unwrap();
    pool.add_relay(RELAY_C, Some(Policy::write_only())).await.unwrap();
    pool.set_secret_key(test_secret_key()).await;

    let (event, statuses) = pool
        .publish(nostr::Event::new(1, vec![], "hello pool"))
        .await
        .unwrap();
    assert!(event.check_signature().unwrap());
    assert_eq!(
        event.pubkey,
        nostr::get_public_key_hex(&test_secret_key()).unwrap()
    );

    let statuses = collect_statuses(statuses).await;
    assert_eq!(
        statuses,
        vec![
            PublishStatus {
                relay: RELAY_A.to_string(),
                status: PublishState::Sent,
            },
            PublishStatus {
                relay: RELAY_C.to_string(),
                status: PublishState::Sent,
            },
        ]
    );

    for url in [RELAY_A, RELAY_C] {
        let sent = transport.relay(url).sent_labelled("EVENT");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][1]["id"], event.id.as_str());
        assert_eq!(sent[0][1]["sig"], event.sig.as_str());
    }
    assert!(transport.relay(RELAY_B).sent_labelled("EVENT").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_watches_each_relay_for_echo() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();

    let event = signed_event("watched");
    let (_, statuses) = pool.publish(event.clone()).await.unwrap();
    assert_eq!(collect_statuses(statuses).await.len(), 2);

    // One observation subscription per relay, bound to that relay only
    for url in [RELAY_A, RELAY_B] {
        let relay = transport.relay(url);
        wait_until(|| relay.sent_labelled("REQ").len() == 1).await;
        let req = &relay.sent_labelled("REQ")[0];
        assert_eq!(req[2], serde_json::json!({ "ids": [event.id] }));
    }
    let observing = pool.subscription_ids().await;
    assert_eq!(observing.len(), 2);
    for id in &observing {
        assert_eq!(pool.subscription_relays(id).await.len(), 1);
    }

    // The echo is consumed by the observer
    let relay_a = transport.relay(RELAY_A);
    let observer_id = relay_a.requested_ids()[0].clone();
    relay_a.push_text(event_frame(&observer_id, &event));

    tokio::time::sleep(PUBLISH_OBSERVATION_WINDOW + Duration::from_secs(1)).await;

    let relay_b = transport.relay(RELAY_B);
    wait_until(|| relay_a.closed_ids().len() == 1 && relay_b.closed_ids().len() == 1).await;
    assert_eq!(relay_a.closed_ids(), relay_a.requested_ids());
    assert_eq!(relay_b.closed_ids(), relay_b.requested_ids());
    assert!(pool.subscription_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_reports_write_failures() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    pool.add_relay(RELAY_B, None).await.unwrap();
    transport.relay(RELAY_B).set_fail_writes(true);

    let (_, statuses) = pool.publish(signed_event("partial")).await.unwrap();
    let statuses = collect_statuses(statuses).await;

    assert_eq!(statuses[0].relay, RELAY_A);
    assert_eq!(statuses[0].status, PublishState::Sent);
    assert_eq!(statuses[1].relay, RELAY_B);
    assert_eq!(statuses[1].status, PublishState::Failed);

    // Only the relay that accepted the write is watched
    let relay_a = transport.relay(RELAY_A);
    wait_until(|| relay_a.requested_ids().len() == 1).await;
    assert_eq!(pool.subscription_ids().await.len(), 1);
    assert!(transport.relay(RELAY_B).sent_messages().is_empty());
}

#[tokio::test]
async fn test_publish_unsigned_without_key_does_no_io() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();

    let result = pool.publish(nostr::Event::new(1, vec![], "unsigned")).await;

    assert!(matches!(result, Err(ClientError::NoSigningKey)));
    assert!(transport.relay(RELAY_A).sent_messages().is_empty());
    assert!(pool.subscription_ids().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_keeps_existing_signature() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    // A configured key must not re-sign an already signed event
    pool.set_secret_key(nostr::generate_secret_key()).await;

    let event = signed_event("pre-signed");
    let (published, statuses) = pool.publish(event.clone()).await.unwrap();
    assert_eq!(published, event);
    collect_statuses(statuses).await;

    let sent = transport.relay(RELAY_A).sent_labelled("EVENT");
    assert_eq!(sent[0][1], serde_json::to_value(&event).unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_publish_does_not_disturb_user_subscriptions() {
    let (pool, transport) = mock_pool();
    pool.add_relay(RELAY_A, None).await.unwrap();
    let mut feed = pool.subscribe(EventFilter::new().kinds([1])).await;

    let event = signed_event("own note");
    let (_, statuses) = pool.publish(event.clone()).await.unwrap();
    collect_statuses(statuses).await;

    // The relay echoes to the user's subscription as well
    transport
        .relay(RELAY_A)
        .push_text(event_frame(feed.id(), &event));
    let message = feed.recv().await.unwrap();
    assert_eq!(message.event, event);

    tokio::time::sleep(PUBLISH_OBSERVATION_WINDOW + Duration::from_secs(1)).await;
    assert_eq!(pool.subscription_ids().await, vec![feed.id().to_string()]);
}
