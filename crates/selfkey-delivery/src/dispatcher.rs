//! Event dispatcher and per-subscription delivery loop.
//!
//! `dispatch` fans one booking event out to every matching subscription,
//! each on its own tokio task so a slow or dead endpoint never delays the
//! business operation that raised the event. Each task runs an explicit
//! attempt loop: send, log exactly one audit row, then either stop on
//! success, sleep and retry, or give up and update the failure streak.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use selfkey_core::{
    models::{BookingEvent, DeliveryLog, SubscriptionId, WebhookSubscription},
    time::Clock,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    client::{ClientConfig, DeliveryClient, DeliveryRequest},
    error::Result,
    retry::{RetryDecision, RetryPolicy},
    signature::sign_payload,
    storage::DeliveryStore,
};

/// Consecutive fully-failed chains before a subscription is disabled.
pub const DEFAULT_AUTO_DISABLE_THRESHOLD: u32 = 10;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// HTTP client settings.
    pub client: ClientConfig,
    /// Consecutive fully-failed chains before automatic deactivation.
    pub auto_disable_threshold: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            auto_disable_threshold: DEFAULT_AUTO_DISABLE_THRESHOLD,
        }
    }
}

/// Outcome of one delivery chain, returned to tests via the join handle.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Subscription the chain targeted.
    pub webhook_id: SubscriptionId,
    /// How many attempts were made.
    pub attempts: u32,
    /// Whether any attempt received a 2xx response.
    pub delivered: bool,
}

/// Fans booking events out to subscribed webhook endpoints.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn DeliveryStore>,
    client: Arc<DeliveryClient>,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given store and clock.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = Arc::new(DeliveryClient::new(config.client.clone())?);
        Ok(Self { store, client, config, clock })
    }

    /// Fans an event out to every active matching subscription.
    ///
    /// Spawns one independent task per subscription and returns immediately.
    /// Callers in production drop the handles (fire and forget); tests join
    /// them to await the reports. An event with no subscribers is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Storage` if the subscription lookup fails.
    /// Individual delivery failures never surface here.
    pub async fn dispatch(&self, event: &BookingEvent) -> Result<Vec<JoinHandle<DeliveryReport>>> {
        let subscriptions =
            self.store.find_active_subscriptions(event.tenant_id, &event.name).await?;

        if subscriptions.is_empty() {
            debug!(
                tenant_id = %event.tenant_id,
                event = %event.name,
                "no active subscriptions for event"
            );
            return Ok(Vec::new());
        }

        info!(
            tenant_id = %event.tenant_id,
            event = %event.name,
            subscriptions = subscriptions.len(),
            "dispatching event"
        );

        let mut handles = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let dispatcher = self.clone();
            let event = event.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.deliver_to_subscription(&subscription, &event).await
            }));
        }

        Ok(handles)
    }

    /// Runs the full delivery chain for one subscription.
    ///
    /// Builds the payload and signature once so every attempt sends
    /// byte-identical content, then loops: attempt, log, retry or stop.
    pub async fn deliver_to_subscription(
        &self,
        subscription: &WebhookSubscription,
        event: &BookingEvent,
    ) -> DeliveryReport {
        let payload = match crate::payload::build_payload(event, subscription.format) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    webhook_id = %subscription.id,
                    event = %event.name,
                    "cannot build payload: {e}"
                );
                self.finish_failed_chain(subscription).await;
                return DeliveryReport {
                    webhook_id: subscription.id,
                    attempts: 0,
                    delivered: false,
                };
            },
        };

        let signature = match &subscription.signing_secret {
            Some(secret) => match sign_payload(secret, &payload) {
                Ok(signature) => Some(signature),
                Err(e) => {
                    error!(webhook_id = %subscription.id, "cannot sign payload: {e}");
                    self.finish_failed_chain(subscription).await;
                    return DeliveryReport {
                        webhook_id: subscription.id,
                        attempts: 0,
                        delivered: false,
                    };
                },
            },
            None => None,
        };

        let policy = RetryPolicy::from_subscription(subscription);
        let mut request = DeliveryRequest {
            url: subscription.url.clone(),
            body: payload.clone(),
            content_type: subscription.format.content_type().to_string(),
            event: event.name.clone(),
            attempt_number: 0,
            signature,
        };

        for attempt in 1..=policy.max_attempts {
            request.attempt_number = attempt;
            let attempted_at: DateTime<Utc> = self.clock.now_system().into();
            let started = std::time::Instant::now();

            let mut log = DeliveryLog {
                id: Uuid::new_v4(),
                webhook_id: subscription.id,
                booking_id: event.booking_id,
                event: event.name.clone(),
                url: subscription.url.clone(),
                payload: payload.clone(),
                status_code: 0,
                response_body: None,
                succeeded: false,
                attempt_number: i32::try_from(attempt).unwrap_or(i32::MAX),
                duration_ms: 0,
                error_message: None,
                attempted_at,
            };

            let succeeded = match self.client.deliver(&request).await {
                Ok(response) => {
                    log.status_code = i32::from(response.status_code);
                    log.response_body = Some(response.body);
                    log.succeeded = response.is_success;
                    log.duration_ms =
                        i64::try_from(response.duration.as_millis()).unwrap_or(i64::MAX);
                    response.is_success
                },
                Err(e) => {
                    log.duration_ms =
                        i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
                    log.error_message = Some(e.to_string());
                    false
                },
            };

            self.append_log(log).await;

            if succeeded {
                info!(
                    webhook_id = %subscription.id,
                    event = %event.name,
                    attempt,
                    "webhook delivered"
                );
                if let Err(e) = self.store.reset_failures(subscription.id).await {
                    warn!(webhook_id = %subscription.id, "cannot reset failure streak: {e}");
                }
                return DeliveryReport {
                    webhook_id: subscription.id,
                    attempts: attempt,
                    delivered: true,
                };
            }

            match policy.decide(attempt) {
                RetryDecision::Retry { delay } => {
                    debug!(
                        webhook_id = %subscription.id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        "scheduling retry"
                    );
                    self.clock.sleep(delay).await;
                },
                RetryDecision::GiveUp => break,
            }
        }

        warn!(
            webhook_id = %subscription.id,
            event = %event.name,
            attempts = policy.max_attempts,
            "delivery chain exhausted"
        );
        self.finish_failed_chain(subscription).await;

        DeliveryReport {
            webhook_id: subscription.id,
            attempts: policy.max_attempts,
            delivered: false,
        }
    }

    /// Appends one audit row. A lost row is logged but never aborts the
    /// chain; delivery semantics outrank audit completeness here.
    async fn append_log(&self, log: DeliveryLog) {
        let webhook_id = log.webhook_id;
        if let Err(e) = self.store.append_log(log).await {
            error!(webhook_id = %webhook_id, "cannot persist delivery log: {e}");
        }
    }

    /// Bumps the failure streak and deactivates the subscription once the
    /// configured threshold is reached.
    async fn finish_failed_chain(&self, subscription: &WebhookSubscription) {
        let streak = match self.store.record_failure(subscription.id).await {
            Ok(streak) => streak,
            Err(e) => {
                error!(webhook_id = %subscription.id, "cannot record failed chain: {e}");
                return;
            },
        };

        let threshold = i64::from(self.config.auto_disable_threshold);
        if threshold > 0 && i64::from(streak) >= threshold {
            match self.store.deactivate(subscription.id).await {
                Ok(()) => {
                    error!(
                        webhook_id = %subscription.id,
                        tenant_id = %subscription.tenant_id,
                        consecutive_failures = streak,
                        "subscription disabled after repeated delivery failures"
                    );
                },
                Err(e) => {
                    error!(webhook_id = %subscription.id, "cannot deactivate subscription: {e}");
                },
            }
        }
    }
}
