use chrono::{Duration, Utc};
use inspectos_shared::{
    Action, ActionStatus, BackoffStrategy, RetryPolicy, RetryStatus, TriggerScope, TriggerType,
    WebhookActionConfig, WebhookStatus,
};
use std::sync::atomic::Ordering;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use crate::tests::fixtures::*;
use crate::webhooks::signature;
use crate::webhooks::{DeliveryConfig, DeliveryError, WebhookEvent, WebhookStore};
use crate::workflows::TriggerContext;

async fn endpoint(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

fn header<'a>(request: &'a Request, name: &str) -> &'a str {
    request.headers.get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_delivery_is_signed_over_exact_body() {
    let server = endpoint(200, "ok").await;
    let tenant = uuid::Uuid::new_v4();
    let mut hook = webhook(tenant, &format!("{}/hook", server.uri()), &["order.created"]);
    hook.headers.insert("X-Api-Key".to_string(), "k-123".to_string());
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({"order_id": "ord_1"}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(report.success);
    let received = requests(&server).await;
    assert_eq!(received.len(), 1);
    let request = &received[0];

    assert!(signature::verify("whsec_test", &request.body, header(request, "x-webhook-signature")));
    assert!(!signature::verify("wrong", &request.body, header(request, "x-webhook-signature")));
    assert_eq!(header(request, "content-type"), "application/json");
    assert_eq!(header(request, "x-webhook-event"), "order.created");
    assert_eq!(header(request, "x-webhook-attempt"), "1");
    assert_eq!(header(request, "x-webhook-delivery"), report.delivery_id.to_string());
    assert_eq!(header(request, "x-api-key"), "k-123");

    let envelope: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(envelope["event"], "order.created");
    assert_eq!(envelope["tenant_id"], serde_json::json!(tenant));
    assert_eq!(envelope["data"]["order_id"], "ord_1");
    assert_eq!(envelope["metadata"]["webhook_id"], serde_json::json!(hook.id));
    assert_eq!(envelope["metadata"]["delivery_id"], serde_json::json!(report.delivery_id));
}

#[tokio::test]
async fn test_success_logs_delivery_and_resets_failures() {
    let server = endpoint(204, "").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["client.created"]);
    hook.failure_count = 2;
    hook.last_error = Some("HTTP 500".to_string());
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    dispatcher
        .deliver(hook.id, "client.created", serde_json::json!({}), 1)
        .await
        .unwrap();

    let stored = store.webhook(hook.id);
    assert_eq!(stored.failure_count, 0);
    assert!(stored.last_error.is_none());
    assert!(stored.last_success_at.is_some());

    let deliveries = store.deliveries_for(hook.id);
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].response_status, Some(204));
    assert!(deliveries[0].response_time_ms.is_some());
    assert!(deliveries[0].error.is_none());
    assert!(store.retries().is_empty());
}

#[tokio::test]
async fn test_failure_schedules_retry_with_backoff() {
    let server = endpoint(500, "boom").await;
    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["invoice.paid"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let before = Utc::now();
    let report = dispatcher
        .deliver(hook.id, "invoice.paid", serde_json::json!({"amount": 120}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.status, Some(500));
    assert_eq!(report.error.as_deref(), Some("HTTP 500: boom"));

    let delivery = &store.deliveries_for(hook.id)[0];
    assert_eq!(delivery.error.as_deref(), Some("HTTP 500"));
    assert_eq!(delivery.response_body.as_deref(), Some("boom"));
    assert_eq!(delivery.attempt_number, 1);

    let stored = store.webhook(hook.id);
    assert_eq!(stored.failure_count, 1);
    assert_eq!(stored.last_error.as_deref(), Some("HTTP 500: boom"));
    assert_eq!(stored.status, WebhookStatus::Active);

    let retries = store.pending_retries();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt_number, 2);
    assert_eq!(retries[0].event_type, "invoice.paid");
    assert_eq!(retries[0].payload["amount"], 120);
    assert_eq!(Some(retries[0].run_at), report.retry_at);
    assert!(retries[0].run_at >= before + Duration::seconds(2));
    assert!(retries[0].run_at <= Utc::now() + Duration::seconds(2));
}

#[tokio::test]
async fn test_linear_backoff_grows_by_one_second() {
    let server = endpoint(503, "busy").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.updated"]);
    hook.retry_strategy = RetryPolicy {
        max_attempts: 5,
        backoff: BackoffStrategy::Linear,
        timeout: Some(10_000),
    };
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let before = Utc::now();
    dispatcher
        .deliver(hook.id, "order.updated", serde_json::json!({}), 3)
        .await
        .unwrap();

    let retry = &store.pending_retries()[0];
    assert_eq!(retry.attempt_number, 4);
    assert!(retry.run_at >= before + Duration::seconds(3));
    assert!(retry.run_at < before + Duration::seconds(4));
}

#[tokio::test]
async fn test_no_retry_after_max_attempts() {
    let server = endpoint(500, "still down").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    hook.retry_strategy.max_attempts = 2;
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 2)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert!(report.retry_at.is_none());
    assert!(store.retries().is_empty());
    assert_eq!(store.deliveries_for(hook.id)[0].attempt_number, 2);
}

#[tokio::test]
async fn test_retry_sweep_redelivers_next_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["inspection.completed"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    dispatcher
        .deliver(hook.id, "inspection.completed", serde_json::json!({"id": "insp_1"}), 1)
        .await
        .unwrap();

    // Backoff not elapsed
    let report = dispatcher.process_due_retries(Utc::now() - Duration::seconds(1), 10).await.unwrap();
    assert_eq!(report.claimed, 0);

    let report = dispatcher
        .process_due_retries(Utc::now() + Duration::seconds(5), 10)
        .await
        .unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.delivered, 1);

    assert!(store.retries().iter().all(|r| r.status == RetryStatus::Done));
    let deliveries = store.deliveries_for(hook.id);
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[1].attempt_number, 2);
    assert_ne!(deliveries[0].id, deliveries[1].id);
    assert_eq!(store.webhook(hook.id).failure_count, 0);

    let received = requests(&server).await;
    assert_eq!(header(&received[1], "x-webhook-attempt"), "2");
    let envelope: serde_json::Value = serde_json::from_slice(&received[1].body).unwrap();
    assert_eq!(envelope["data"]["id"], "insp_1");
}

#[tokio::test]
async fn test_retry_for_paused_webhook_is_dropped() {
    let server = endpoint(500, "down").await;
    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap();
    store.set_status(hook.id, WebhookStatus::Paused).await.unwrap();

    let report = dispatcher
        .process_due_retries(Utc::now() + Duration::seconds(5), 10)
        .await
        .unwrap();

    assert_eq!(report.dropped, 1);
    assert!(store.retries().iter().all(|r| r.status == RetryStatus::Done));
    assert_eq!(requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_retry_released_when_storage_fails() {
    let server = endpoint(500, "down").await;
    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap();
    store.fail_deliveries.store(true, Ordering::SeqCst);

    let now = Utc::now() + Duration::seconds(5);
    let report = dispatcher.process_due_retries(now, 10).await.unwrap();

    assert_eq!(report.released, 1);
    let retries = store.pending_retries();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt_number, 2);
    assert_eq!(retries[0].run_at, now + Duration::seconds(4));
}

#[tokio::test]
async fn test_retry_sweep_continues_when_completion_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    for id in 1..=2 {
        dispatcher
            .deliver(hook.id, "order.created", serde_json::json!({"id": id}), 1)
            .await
            .unwrap();
    }
    assert_eq!(store.pending_retries().len(), 2);
    store.fail_completions.store(true, Ordering::SeqCst);

    let report = dispatcher
        .process_due_retries(Utc::now() + Duration::seconds(5), 10)
        .await
        .unwrap();

    assert_eq!(report.claimed, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(requests(&server).await.len(), 4);
    assert!(store.retries().iter().all(|r| r.status == RetryStatus::InFlight));
}

#[tokio::test]
async fn test_transport_error_is_logged_and_retried() {
    let hook = webhook(uuid::Uuid::new_v4(), "http://127.0.0.1:1/hook", &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert!(report.status.is_none());
    assert!(report.error.is_some());

    let delivery = &store.deliveries_for(hook.id)[0];
    assert!(delivery.response_status.is_none());
    assert!(delivery.response_time_ms.is_none());
    assert_eq!(delivery.error, report.error);
    assert_eq!(store.webhook(hook.id).failure_count, 1);
    assert_eq!(store.pending_retries().len(), 1);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(7)))
        .mount(&server)
        .await;

    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    hook.retry_strategy.timeout = Some(5_000);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let config = DeliveryConfig {
        default_timeout: std::time::Duration::from_secs(30),
        ..delivery_config()
    };
    let dispatcher = dispatcher(store.clone(), config);

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert!(report.status.is_none());
    assert_eq!(store.pending_retries().len(), 1);
}

#[tokio::test]
async fn test_policy_without_timeout_uses_configured_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&server)
        .await;

    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    assert!(hook.retry_strategy.timeout.is_none());
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let config = DeliveryConfig {
        default_timeout: std::time::Duration::from_millis(500),
        ..delivery_config()
    };
    let dispatcher = dispatcher(store.clone(), config);

    let started = std::time::Instant::now();
    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert!(report.status.is_none());
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert_eq!(store.webhook(hook.id).failure_count, 1);
}

#[tokio::test]
async fn test_auto_pause_marks_webhook_failed() {
    let server = endpoint(500, "down").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    hook.failure_count = 1;
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let config = DeliveryConfig {
        auto_pause_after: Some(2),
        ..delivery_config()
    };
    let dispatcher = dispatcher(store.clone(), config);

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(report.retry_at.is_none());
    assert_eq!(store.webhook(hook.id).status, WebhookStatus::Failed);
    assert!(store.retries().is_empty());

    // Failed webhooks receive nothing further
    assert!(dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .is_none());
    assert_eq!(requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_without_auto_pause_failures_keep_accumulating() {
    let server = endpoint(500, "down").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    hook.failure_count = 50;
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap();

    let stored = store.webhook(hook.id);
    assert_eq!(stored.failure_count, 51);
    assert_eq!(stored.status, WebhookStatus::Active);
}

#[tokio::test]
async fn test_plain_http_rejected_when_https_required() {
    let server = endpoint(200, "ok").await;
    let hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let config = DeliveryConfig {
        require_https: true,
        ..delivery_config()
    };
    let dispatcher = dispatcher(store.clone(), config);

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap()
        .unwrap();

    assert!(!report.success);
    assert!(report.error.unwrap().contains("https"));
    assert!(requests(&server).await.is_empty());
    assert!(store.retries().is_empty());
    assert_eq!(store.deliveries_for(hook.id).len(), 1);
}

#[tokio::test]
async fn test_inactive_webhook_is_not_called() {
    let server = endpoint(200, "ok").await;
    let mut hook = webhook(uuid::Uuid::new_v4(), &format!("{}/hook", server.uri()), &["order.created"]);
    hook.status = WebhookStatus::Paused;
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let report = dispatcher
        .deliver(hook.id, "order.created", serde_json::json!({}), 1)
        .await
        .unwrap();

    assert!(report.is_none());
    assert!(requests(&server).await.is_empty());
    assert!(store.deliveries().is_empty());
}

#[tokio::test]
async fn test_send_test_truncates_body_and_never_retries() {
    let long_body = "x".repeat(1500);
    let server = endpoint(502, &long_body).await;
    let tenant = uuid::Uuid::new_v4();
    let hook = webhook(tenant, &format!("{}/hook", server.uri()), &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let report = dispatcher
        .send_test(tenant, hook.id, WebhookEvent::InvoicePaid)
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.status, Some(502));
    assert_eq!(report.response_body.as_ref().unwrap().len(), 1000);
    assert!(report.retry_at.is_none());
    assert!(store.retries().is_empty());

    let delivery = &store.deliveries_for(hook.id)[0];
    assert_eq!(delivery.event_type, "invoice.paid");
    assert_eq!(delivery.response_body.as_ref().unwrap().len(), 1500);
    assert_eq!(store.webhook(hook.id).failure_count, 1);

    let received = requests(&server).await;
    let envelope: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(envelope["data"]["invoice"]["invoice_number"], "INV-SAMPLE");
}

#[tokio::test]
async fn test_send_test_requires_tenant_ownership() {
    let hook = webhook(uuid::Uuid::new_v4(), "http://127.0.0.1:1/hook", &["order.created"]);
    let store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let err = dispatcher
        .send_test(uuid::Uuid::new_v4(), hook.id, WebhookEvent::OrderCreated)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::NotFound(id) if id == hook.id));
    assert!(store.deliveries().is_empty());
}

#[tokio::test]
async fn test_fan_out_reaches_only_active_subscribers() {
    let server = endpoint(200, "ok").await;
    let tenant = uuid::Uuid::new_v4();
    let url = format!("{}/hook", server.uri());

    let subscribed = webhook(tenant, &url, &["order.created", "order.updated"]);
    let mut paused = webhook(tenant, &url, &["order.created"]);
    paused.status = WebhookStatus::Paused;
    let unsubscribed = webhook(tenant, &url, &["invoice.paid"]);
    let other_tenant = webhook(uuid::Uuid::new_v4(), &url, &["order.created"]);

    let store = InMemoryWebhookStore::with_webhooks(vec![
        subscribed.clone(),
        paused,
        unsubscribed,
        other_tenant,
    ]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let handles = dispatcher
        .trigger_event(tenant, "order.created", serde_json::json!({"order_id": "ord_9"}))
        .await
        .unwrap();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }

    let deliveries = store.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].webhook_id, subscribed.id);
    assert_eq!(requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_fan_out_with_no_subscribers_is_a_no_op() {
    let store = InMemoryWebhookStore::with_webhooks(vec![]);
    let dispatcher = dispatcher(store.clone(), delivery_config());

    let handles = dispatcher
        .trigger_event(uuid::Uuid::new_v4(), "order.created", serde_json::json!({}))
        .await
        .unwrap();

    assert!(handles.is_empty());
}

#[tokio::test]
async fn test_workflow_webhook_action_delivers_run_payload() {
    let server = endpoint(200, "ok").await;
    let tenant = uuid::Uuid::new_v4();
    let hook = webhook(tenant, &format!("{}/hook", server.uri()), &["client.updated"]);
    let webhook_store = InMemoryWebhookStore::with_webhooks(vec![hook.clone()]);
    let dispatcher = dispatcher(webhook_store.clone(), delivery_config());

    let actions = vec![
        Action::Webhook(WebhookActionConfig {
            event: Some("client.updated".to_string()),
            webhook_id: Some(hook.id),
        }),
        Action::Webhook(WebhookActionConfig {
            event: Some("client.deleted".to_string()),
            webhook_id: None,
        }),
    ];
    let wf = workflow(tenant, TriggerScope::Client, TriggerType::Event, actions);
    let workflows = InMemoryWorkflowStore::with_workflows(vec![wf.clone()]);
    let engine = engine(workflows.clone(), InMemoryEntityStore::new(), Some(dispatcher));
    let client_id = uuid::Uuid::new_v4();

    let runs = engine
        .fire(&TriggerContext {
            tenant_id: tenant,
            scope: TriggerScope::Client,
            entity_id: client_id,
            trigger_type: TriggerType::Event,
            tag_id: None,
            status: None,
            assigned_tag_ids: None,
        })
        .await
        .unwrap();

    let run = workflows.run(runs[0]);
    assert_eq!(run.result.actions[0].status, ActionStatus::Queued);
    assert_eq!(run.result.actions[0].dispatched, Some(1));
    assert_eq!(run.result.actions[1].reason.as_deref(), Some("unknown_event"));

    let mut received = Vec::new();
    for _ in 0..50 {
        received = requests(&server).await;
        if !received.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(received.len(), 1);
    let envelope: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(envelope["data"]["workflow_id"], serde_json::json!(wf.id));
    assert_eq!(envelope["data"]["run_id"], serde_json::json!(run.id));
    assert_eq!(envelope["data"]["entity_id"], serde_json::json!(client_id));
    assert_eq!(envelope["data"]["scope"], "client");
}

#[tokio::test]
async fn test_webhook_action_rejects_foreign_webhook() {
    let tenant = uuid::Uuid::new_v4();
    let foreign = webhook(uuid::Uuid::new_v4(), "http://127.0.0.1:1/hook", &["client.updated"]);
    let webhook_store = InMemoryWebhookStore::with_webhooks(vec![foreign.clone()]);
    let dispatcher = dispatcher(webhook_store.clone(), delivery_config());

    let wf = workflow(
        tenant,
        TriggerScope::Client,
        TriggerType::Event,
        vec![Action::Webhook(WebhookActionConfig {
            event: Some("client.updated".to_string()),
            webhook_id: Some(foreign.id),
        })],
    );
    let workflows = InMemoryWorkflowStore::with_workflows(vec![wf]);
    let engine = engine(workflows.clone(), InMemoryEntityStore::new(), Some(dispatcher));

    let runs = engine
        .fire(&TriggerContext {
            tenant_id: tenant,
            scope: TriggerScope::Client,
            entity_id: uuid::Uuid::new_v4(),
            trigger_type: TriggerType::Event,
            tag_id: None,
            status: None,
            assigned_tag_ids: None,
        })
        .await
        .unwrap();

    let outcome = &workflows.run(runs[0]).result.actions[0];
    assert_eq!(outcome.status, ActionStatus::Skipped);
    assert_eq!(outcome.reason.as_deref(), Some("webhook_not_found"));
    assert!(webhook_store.deliveries().is_empty());
}
