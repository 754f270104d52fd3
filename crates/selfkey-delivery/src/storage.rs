//! Storage abstraction for the delivery pipeline.
//!
//! The dispatcher talks to storage through a trait so integration tests can
//! run against a deterministic in-memory implementation while production
//! uses the PostgreSQL repositories.

use std::sync::Arc;

use async_trait::async_trait;
use selfkey_core::{
    models::{DeliveryLog, SubscriptionId, TenantId, WebhookSubscription},
    storage::Storage,
};

use crate::error::{DeliveryError, Result};

/// Persistence operations the delivery pipeline needs.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Returns active subscriptions for a tenant that want the named event.
    async fn find_active_subscriptions(
        &self,
        tenant_id: TenantId,
        event_name: &str,
    ) -> Result<Vec<WebhookSubscription>>;

    /// Appends one attempt row to the audit log.
    async fn append_log(&self, log: DeliveryLog) -> Result<()>;

    /// Increments the consecutive-failure counter after a fully failed
    /// chain, returning the new value.
    async fn record_failure(&self, id: SubscriptionId) -> Result<i32>;

    /// Clears the consecutive-failure counter after a success.
    async fn reset_failures(&self, id: SubscriptionId) -> Result<()>;

    /// Deactivates a subscription.
    async fn deactivate(&self, id: SubscriptionId) -> Result<()>;
}

/// Production store backed by the PostgreSQL repositories.
#[derive(Clone)]
pub struct PostgresDeliveryStore {
    storage: Arc<Storage>,
}

impl PostgresDeliveryStore {
    /// Wraps the shared storage container.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl DeliveryStore for PostgresDeliveryStore {
    async fn find_active_subscriptions(
        &self,
        tenant_id: TenantId,
        event_name: &str,
    ) -> Result<Vec<WebhookSubscription>> {
        Ok(self.storage.subscriptions.find_active_for_event(tenant_id, event_name).await?)
    }

    async fn append_log(&self, log: DeliveryLog) -> Result<()> {
        self.storage.delivery_logs.create(&log).await?;
        Ok(())
    }

    async fn record_failure(&self, id: SubscriptionId) -> Result<i32> {
        Ok(self.storage.subscriptions.record_failure(id).await?)
    }

    async fn reset_failures(&self, id: SubscriptionId) -> Result<()> {
        Ok(self.storage.subscriptions.reset_failures(id).await?)
    }

    async fn deactivate(&self, id: SubscriptionId) -> Result<()> {
        Ok(self.storage.subscriptions.deactivate(id).await?)
    }
}

/// Deterministic in-memory store for tests.
pub mod mock {
    use std::{collections::HashMap, sync::RwLock};

    use super::*;

    /// In-memory `DeliveryStore` with inspectable state.
    #[derive(Default)]
    pub struct MockDeliveryStore {
        subscriptions: RwLock<HashMap<SubscriptionId, WebhookSubscription>>,
        logs: RwLock<Vec<DeliveryLog>>,
    }

    impl MockDeliveryStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a subscription.
        pub fn add_subscription(&self, sub: WebhookSubscription) {
            if let Ok(mut subs) = self.subscriptions.write() {
                subs.insert(sub.id, sub);
            }
        }

        /// Returns a snapshot of all logged attempts, in append order.
        pub fn logs(&self) -> Vec<DeliveryLog> {
            self.logs.read().map(|l| l.clone()).unwrap_or_default()
        }

        /// Returns logged attempts for one subscription, in append order.
        pub fn logs_for(&self, id: SubscriptionId) -> Vec<DeliveryLog> {
            self.logs().into_iter().filter(|l| l.webhook_id == id).collect()
        }

        /// Whether a subscription is currently active.
        pub fn is_active(&self, id: SubscriptionId) -> bool {
            self.subscriptions
                .read()
                .ok()
                .and_then(|subs| subs.get(&id).map(|s| s.is_active))
                .unwrap_or(false)
        }

        /// Current consecutive-failure counter for a subscription.
        pub fn consecutive_failures(&self, id: SubscriptionId) -> i32 {
            self.subscriptions
                .read()
                .ok()
                .and_then(|subs| subs.get(&id).map(|s| s.consecutive_failures))
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl DeliveryStore for MockDeliveryStore {
        async fn find_active_subscriptions(
            &self,
            tenant_id: TenantId,
            event_name: &str,
        ) -> Result<Vec<WebhookSubscription>> {
            let subs = self
                .subscriptions
                .read()
                .map_err(|_| DeliveryError::storage("subscription lock poisoned"))?;

            let mut matching: Vec<WebhookSubscription> = subs
                .values()
                .filter(|s| {
                    s.tenant_id == tenant_id && s.is_active && s.subscribes_to(event_name)
                })
                .cloned()
                .collect();
            matching.sort_by_key(|s| s.created_at);

            Ok(matching)
        }

        async fn append_log(&self, log: DeliveryLog) -> Result<()> {
            self.logs
                .write()
                .map_err(|_| DeliveryError::storage("log lock poisoned"))?
                .push(log);
            Ok(())
        }

        async fn record_failure(&self, id: SubscriptionId) -> Result<i32> {
            let mut subs = self
                .subscriptions
                .write()
                .map_err(|_| DeliveryError::storage("subscription lock poisoned"))?;

            let sub = subs
                .get_mut(&id)
                .ok_or_else(|| DeliveryError::storage(format!("subscription {id} not found")))?;
            sub.consecutive_failures += 1;
            Ok(sub.consecutive_failures)
        }

        async fn reset_failures(&self, id: SubscriptionId) -> Result<()> {
            let mut subs = self
                .subscriptions
                .write()
                .map_err(|_| DeliveryError::storage("subscription lock poisoned"))?;

            if let Some(sub) = subs.get_mut(&id) {
                sub.consecutive_failures = 0;
            }
            Ok(())
        }

        async fn deactivate(&self, id: SubscriptionId) -> Result<()> {
            let mut subs = self
                .subscriptions
                .write()
                .map_err(|_| DeliveryError::storage("subscription lock poisoned"))?;

            if let Some(sub) = subs.get_mut(&id) {
                sub.is_active = false;
                sub.deactivated_at = Some(chrono::Utc::now());
            }
            Ok(())
        }
    }
}
