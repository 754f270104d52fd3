//! Database access layer implementing the repository pattern for webhook
//! persistence.
//!
//! The repository layer translates between domain models and the database
//! schema. All database operations go through these repositories; direct SQL
//! queries outside this module are forbidden to keep the schema isolated.

use std::sync::Arc;

use sqlx::PgPool;

pub mod delivery_logs;
pub mod subscriptions;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
///
/// Entry point for all persistence in the notification pipeline. Manages a
/// shared connection pool and exposes each domain repository.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook subscription configuration.
    pub subscriptions: Arc<subscriptions::Repository>,

    /// Repository for the append-only delivery audit log.
    pub delivery_logs: Arc<delivery_logs::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    ///
    /// All repositories share the same pool via Arc.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            subscriptions: Arc::new(subscriptions::Repository::new(pool.clone())),
            delivery_logs: Arc::new(delivery_logs::Repository::new(pool)),
        }
    }

    /// Creates the schema objects this crate needs, idempotently.
    ///
    /// The host application owns its own migration story; this helper exists
    /// for integration tests and fresh environments.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if any DDL statement fails.
    pub async fn migrate(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS webhook_subscriptions (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                events JSONB NOT NULL DEFAULT '[]',
                format TEXT NOT NULL DEFAULT 'json',
                signing_secret TEXT,
                retry_count INTEGER NOT NULL DEFAULT 3,
                retry_delay_seconds INTEGER NOT NULL DEFAULT 30,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deactivated_at TIMESTAMPTZ
            )
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_subscriptions_tenant_active
            ON webhook_subscriptions (tenant_id) WHERE is_active
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS webhook_delivery_logs (
                id UUID PRIMARY KEY,
                webhook_id UUID NOT NULL REFERENCES webhook_subscriptions(id),
                booking_id UUID,
                event TEXT NOT NULL,
                url TEXT NOT NULL,
                payload TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                response_body TEXT,
                succeeded BOOLEAN NOT NULL,
                attempt_number INTEGER NOT NULL,
                duration_ms BIGINT NOT NULL,
                error_message TEXT,
                attempted_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_delivery_logs_webhook
            ON webhook_delivery_logs (webhook_id, attempted_at DESC)
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_delivery_logs_booking
            ON webhook_delivery_logs (booking_id) WHERE booking_id IS NOT NULL
            ",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) =
            sqlx::query_as("SELECT 1").fetch_one(&*self.subscriptions.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Actual database testing happens in integration tests
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
