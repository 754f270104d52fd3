//! Repository for webhook subscription database operations.
//!
//! Manages tenant-configured subscriptions including event filters, retry
//! policies, signing secrets, and the consecutive-failure counter that backs
//! automatic deactivation.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{SubscriptionId, TenantId, WebhookSubscription},
};

/// Repository for webhook subscription database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates a new subscription.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or constraints are violated.
    pub async fn create(&self, sub: &WebhookSubscription) -> Result<SubscriptionId> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO webhook_subscriptions (
                id, tenant_id, name, url, events, format, signing_secret,
                retry_count, retry_delay_seconds, is_active,
                consecutive_failures, created_at, updated_at, deactivated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
            )
            RETURNING id
            ",
        )
        .bind(sub.id.0)
        .bind(sub.tenant_id.0)
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(&sub.events)
        .bind(sub.format)
        .bind(&sub.signing_secret)
        .bind(sub.retry_count)
        .bind(sub.retry_delay_seconds)
        .bind(sub.is_active)
        .bind(sub.consecutive_failures)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .bind(sub.deactivated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(SubscriptionId(id))
    }

    /// Finds a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<WebhookSubscription>> {
        let sub = sqlx::query_as(
            "SELECT * FROM webhook_subscriptions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(sub)
    }

    /// Finds active subscriptions for a tenant that include the given event
    /// name in their filter.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_for_event(
        &self,
        tenant_id: TenantId,
        event_name: &str,
    ) -> Result<Vec<WebhookSubscription>> {
        let subs = sqlx::query_as(
            r"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1
              AND is_active
              AND events @> $2::jsonb
            ORDER BY created_at
            ",
        )
        .bind(tenant_id.0)
        .bind(serde_json::json!([event_name]))
        .fetch_all(&*self.pool)
        .await?;

        Ok(subs)
    }

    /// Updates a subscription's tenant-editable configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the subscription does not exist.
    pub async fn update(&self, sub: &WebhookSubscription) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET name = $2, url = $3, events = $4, format = $5,
                signing_secret = $6, retry_count = $7, retry_delay_seconds = $8,
                updated_at = $9
            WHERE id = $1
            ",
        )
        .bind(sub.id.0)
        .bind(&sub.name)
        .bind(&sub.url)
        .bind(&sub.events)
        .bind(sub.format)
        .bind(&sub.signing_secret)
        .bind(sub.retry_count)
        .bind(sub.retry_delay_seconds)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("subscription {} not found", sub.id)));
        }

        Ok(())
    }

    /// Enables or disables a subscription. Re-enabling clears the failure
    /// streak and deactivation timestamp.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the subscription does not exist.
    pub async fn set_active(&self, id: SubscriptionId, active: bool) -> Result<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET is_active = $2,
                consecutive_failures = CASE WHEN $2 THEN 0 ELSE consecutive_failures END,
                deactivated_at = CASE WHEN $2 THEN NULL ELSE $3 END,
                updated_at = $3
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(active)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("subscription {id} not found")));
        }

        Ok(())
    }

    /// Increments the consecutive-failure counter after a fully failed
    /// delivery chain and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the subscription does not exist.
    pub async fn record_failure(&self, id: SubscriptionId) -> Result<i32> {
        let count = sqlx::query_scalar(
            r"
            UPDATE webhook_subscriptions
            SET consecutive_failures = consecutive_failures + 1, updated_at = $2
            WHERE id = $1
            RETURNING consecutive_failures
            ",
        )
        .bind(id.0)
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("subscription {id} not found")))?;

        Ok(count)
    }

    /// Resets the consecutive-failure counter after a successful delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn reset_failures(&self, id: SubscriptionId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE webhook_subscriptions
            SET consecutive_failures = 0, updated_at = $2
            WHERE id = $1 AND consecutive_failures <> 0
            ",
        )
        .bind(id.0)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Deactivates a subscription, recording when it happened.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the subscription does not exist.
    pub async fn deactivate(&self, id: SubscriptionId) -> Result<()> {
        self.set_active(id, false).await
    }

    /// Counts all subscriptions belonging to a tenant.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_tenant(&self, tenant_id: TenantId) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM webhook_subscriptions WHERE tenant_id = $1",
        )
        .bind(tenant_id.0)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count)
    }
}
