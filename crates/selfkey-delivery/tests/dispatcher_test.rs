//! Integration tests for event dispatch and the retry loop.
//!
//! Uses wiremock endpoints, the in-memory store, and a virtual clock so
//! chains with long configured delays finish instantly.

use std::sync::Arc;

use anyhow::Result;
use selfkey_core::{models::PayloadFormat, TenantId, TestClock};
use selfkey_delivery::{
    storage::mock::MockDeliveryStore, verify_signature, DeliveryReport, Dispatcher,
    DispatcherConfig,
};
use selfkey_testing::{booking_completed, SubscriptionBuilder};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn dispatcher(store: Arc<MockDeliveryStore>, threshold: u32) -> Result<Dispatcher> {
    let config = DispatcherConfig { auto_disable_threshold: threshold, ..Default::default() };
    Ok(Dispatcher::new(store, config, Arc::new(TestClock::new()))?)
}

async fn join_all(
    handles: Vec<tokio::task::JoinHandle<DeliveryReport>>,
) -> Vec<DeliveryReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await.expect("delivery task must not panic"));
    }
    reports
}

#[tokio::test]
async fn failing_endpoint_gets_exactly_retry_count_attempts() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri())
        .retry_count(3)
        .retry_delay_seconds(30)
        .build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;

    assert_eq!(reports.len(), 1);
    assert!(!reports[0].delivered);
    assert_eq!(reports[0].attempts, 3);

    let logs = store.logs_for(sub_id);
    assert_eq!(logs.len(), 3);
    for (i, log) in logs.iter().enumerate() {
        assert_eq!(log.attempt_number, i as i32 + 1);
        assert!(!log.succeeded);
        assert_eq!(log.status_code, 500);
        assert_eq!(log.response_body.as_deref(), Some("boom"));
    }

    assert_eq!(store.consecutive_failures(sub_id), 1);
    assert!(store.is_active(sub_id));
    Ok(())
}

#[tokio::test]
async fn chain_halts_on_first_success() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri()).retry_count(5).build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;

    assert!(reports[0].delivered);
    assert_eq!(reports[0].attempts, 2);

    let logs = store.logs_for(sub_id);
    assert_eq!(logs.len(), 2);
    assert!(!logs[0].succeeded);
    assert!(logs[1].succeeded);
    assert_eq!(logs[1].status_code, 200);

    assert_eq!(store.consecutive_failures(sub_id), 0);
    Ok(())
}

#[tokio::test]
async fn event_without_subscribers_is_a_noop() -> Result<()> {
    let store = Arc::new(MockDeliveryStore::new());
    let dispatcher = dispatcher(store.clone(), 10)?;

    let handles = dispatcher.dispatch(&booking_completed(TenantId::new())).await?;

    assert!(handles.is_empty());
    assert!(store.logs().is_empty());
    Ok(())
}

#[tokio::test]
async fn inactive_and_mismatched_subscriptions_are_skipped() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(SubscriptionBuilder::new(tenant, server.uri()).inactive().build());
    store.add_subscription(
        SubscriptionBuilder::new(tenant, server.uri()).events(&["booking.cancelled"]).build(),
    );
    // Another tenant's subscription must never see this event
    store.add_subscription(SubscriptionBuilder::new(TenantId::new(), server.uri()).build());

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;

    assert!(handles.is_empty());
    assert!(store.logs().is_empty());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    Ok(())
}

#[tokio::test]
async fn one_event_fans_out_to_all_matching_subscriptions() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(SubscriptionBuilder::new(tenant, server.uri()).build());
    store.add_subscription(SubscriptionBuilder::new(tenant, server.uri()).build());
    store.add_subscription(SubscriptionBuilder::new(tenant, server.uri()).build());

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.delivered));
    assert_eq!(store.logs().len(), 3);
    Ok(())
}

#[tokio::test]
async fn repeated_failed_chains_disable_the_subscription() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri()).retry_count(1).build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 2)?;

    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;
    assert!(store.is_active(sub_id), "first failed chain must not disable");

    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;
    assert!(!store.is_active(sub_id), "second failed chain must disable");

    // Disabled subscriptions get no further deliveries
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    assert!(handles.is_empty());
    assert_eq!(store.logs_for(sub_id).len(), 2);
    Ok(())
}

#[tokio::test]
async fn success_resets_the_failure_streak() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri()).retry_count(1).build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;

    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;
    assert_eq!(store.consecutive_failures(sub_id), 1);

    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;
    assert_eq!(store.consecutive_failures(sub_id), 0);
    Ok(())
}

#[tokio::test]
async fn network_failure_logs_status_zero_with_error() -> Result<()> {
    let tenant = TenantId::new();
    // Port 1 is never listening
    let sub = SubscriptionBuilder::new(tenant, "http://127.0.0.1:1/webhook")
        .retry_count(2)
        .build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;

    assert!(!reports[0].delivered);

    let logs = store.logs_for(sub_id);
    assert_eq!(logs.len(), 2);
    for log in &logs {
        assert_eq!(log.status_code, 0);
        assert!(!log.succeeded);
        assert!(log.error_message.is_some());
        assert!(log.response_body.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn signed_json_delivery_carries_verifiable_signature() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("X-Webhook-Event", "booking.completed"))
        .and(matchers::header("X-Webhook-Attempt", "1"))
        .and(matchers::header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri())
        .signing_secret("whsec_test")
        .build();

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;
    assert!(reports[0].delivered);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);

    let body = String::from_utf8(requests[0].body.clone())?;
    let signature = requests[0]
        .headers
        .get("X-Webhook-Signature")
        .expect("signature header must be present")
        .to_str()?
        .to_string();
    assert!(verify_signature("whsec_test", &body, &signature));

    let envelope: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(envelope["event"], "booking.completed");
    assert!(envelope["timestamp"].is_string());
    assert_eq!(envelope["data"]["reference"], "BK-2024-0042");
    Ok(())
}

#[tokio::test]
async fn csv_subscription_receives_two_line_csv() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("Content-Type", "text/csv"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub =
        SubscriptionBuilder::new(tenant, server.uri()).format(PayloadFormat::Csv).build();

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    let reports = join_all(handles).await;
    assert!(reports[0].delivered);

    let requests = server.received_requests().await.unwrap_or_default();
    let body = String::from_utf8(requests[0].body.clone())?;
    let lines: Vec<&str> = body.split('\n').collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("event,timestamp,"));
    assert!(lines[1].starts_with("booking.completed,"));
    Ok(())
}

#[tokio::test]
async fn retries_send_identical_payload_bytes() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri()).retry_count(3).build();

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(requests[1].body, requests[2].body);
    Ok(())
}

#[tokio::test]
async fn retry_timestamps_follow_the_injected_clock() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri())
        .retry_count(3)
        .retry_delay_seconds(30)
        .build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let clock = Arc::new(TestClock::new());
    let dispatcher = Dispatcher::new(store.clone(), DispatcherConfig::default(), clock)?;

    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;

    // Virtual time only moves during the backoff sleeps, so the log rows
    // must be exactly one linear-backoff step apart
    let logs = store.logs_for(sub_id);
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[1].attempted_at - logs[0].attempted_at, chrono::Duration::seconds(30));
    assert_eq!(logs[2].attempted_at - logs[1].attempted_at, chrono::Duration::seconds(60));
    Ok(())
}

#[tokio::test]
async fn long_response_bodies_are_truncated_in_the_log() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("e".repeat(4000)))
        .mount(&server)
        .await;

    let tenant = TenantId::new();
    let sub = SubscriptionBuilder::new(tenant, server.uri()).retry_count(1).build();
    let sub_id = sub.id;

    let store = Arc::new(MockDeliveryStore::new());
    store.add_subscription(sub);

    let dispatcher = dispatcher(store.clone(), 10)?;
    let handles = dispatcher.dispatch(&booking_completed(tenant)).await?;
    join_all(handles).await;

    let logs = store.logs_for(sub_id);
    assert_eq!(logs[0].response_body.as_ref().map(String::len), Some(1000));
    Ok(())
}
