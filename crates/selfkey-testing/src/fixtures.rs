//! Fixture builders for subscriptions and booking events.

use selfkey_core::models::{
    BookingEvent, BookingId, PayloadFormat, TenantId, WebhookSubscription,
};

/// Builder for test webhook subscriptions.
///
/// Defaults: JSON format, unsigned, 3 attempts, zero retry delay so chains
/// complete instantly under a real clock.
pub struct SubscriptionBuilder {
    subscription: WebhookSubscription,
}

impl SubscriptionBuilder {
    /// Starts a subscription for the given tenant and destination URL.
    pub fn new(tenant_id: TenantId, url: impl Into<String>) -> Self {
        let mut subscription = WebhookSubscription::new(tenant_id, "test subscription", url);
        subscription.events = sqlx::types::Json(vec!["booking.completed".to_string()]);
        subscription.retry_delay_seconds = 0;
        Self { subscription }
    }

    /// Replaces the subscribed event names.
    #[must_use]
    pub fn events(mut self, events: &[&str]) -> Self {
        self.subscription.events =
            sqlx::types::Json(events.iter().map(|e| (*e).to_string()).collect());
        self
    }

    /// Sets the payload format.
    #[must_use]
    pub fn format(mut self, format: PayloadFormat) -> Self {
        self.subscription.format = format;
        self
    }

    /// Enables HMAC signing with the given secret.
    #[must_use]
    pub fn signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.subscription.signing_secret = Some(secret.into());
        self
    }

    /// Sets the maximum attempts per chain.
    #[must_use]
    pub fn retry_count(mut self, count: i32) -> Self {
        self.subscription.retry_count = count;
        self
    }

    /// Sets the base delay between attempts.
    #[must_use]
    pub fn retry_delay_seconds(mut self, seconds: i32) -> Self {
        self.subscription.retry_delay_seconds = seconds;
        self
    }

    /// Marks the subscription inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.subscription.is_active = false;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> WebhookSubscription {
        self.subscription
    }
}

/// A representative `booking.completed` event with a small data object.
pub fn booking_completed(tenant_id: TenantId) -> BookingEvent {
    BookingEvent::new(
        "booking.completed",
        tenant_id,
        serde_json::json!({
            "reference": "BK-2024-0042",
            "guest": "Ada Lovelace",
            "nights": 3,
            "total": 412.5,
        }),
    )
    .with_booking(BookingId::new())
}
