//! Repository for the append-only delivery audit log.
//!
//! Every delivery attempt writes exactly one row here. Rows are never
//! updated or deleted; the log is the authoritative record tenants see in
//! their webhook debugging UI.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{BookingId, DeliveryLog, SubscriptionId},
};

/// Repository for delivery log database operations.
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

    /// Appends one attempt row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, log: &DeliveryLog) -> Result<Uuid> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO webhook_delivery_logs (
                id, webhook_id, booking_id, event, url, payload,
                status_code, response_body, succeeded, attempt_number,
                duration_ms, error_message, attempted_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
            )
            RETURNING id
            ",
        )
        .bind(log.id)
        .bind(log.webhook_id.0)
        .bind(log.booking_id.map(|b| b.0))
        .bind(&log.event)
        .bind(&log.url)
        .bind(&log.payload)
        .bind(log.status_code)
        .bind(&log.response_body)
        .bind(log.succeeded)
        .bind(log.attempt_number)
        .bind(log.duration_ms)
        .bind(&log.error_message)
        .bind(log.attempted_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Lists attempts for a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_webhook(
        &self,
        webhook_id: SubscriptionId,
        limit: i64,
    ) -> Result<Vec<DeliveryLog>> {
        let logs = sqlx::query_as(
            r"
            SELECT * FROM webhook_delivery_logs
            WHERE webhook_id = $1
            ORDER BY attempted_at DESC
            LIMIT $2
            ",
        )
        .bind(webhook_id.0)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Lists all attempts associated with a booking, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_booking(&self, booking_id: BookingId) -> Result<Vec<DeliveryLog>> {
        let logs = sqlx::query_as(
            r"
            SELECT * FROM webhook_delivery_logs
            WHERE booking_id = $1
            ORDER BY attempted_at
            ",
        )
        .bind(booking_id.0)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Counts failed attempts for a subscription within the most recent
    /// `limit` rows. Used for operator dashboards.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_recent_failures(
        &self,
        webhook_id: SubscriptionId,
        limit: i64,
    ) -> Result<i64> {
        let count = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM (
                SELECT succeeded FROM webhook_delivery_logs
                WHERE webhook_id = $1
                ORDER BY attempted_at DESC
                LIMIT $2
            ) recent
            WHERE NOT succeeded
            ",
        )
        .bind(webhook_id.0)
        .bind(limit)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count)
    }
}
