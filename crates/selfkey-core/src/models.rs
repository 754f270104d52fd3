//! Core domain models and strongly-typed identifiers.
//!
//! Defines webhook subscriptions, delivery log rows, booking events, and
//! newtype ID wrappers for compile-time type safety. Includes database
//! serialization traits for the notification pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed tenant identifier.
///
/// Provides multi-tenancy isolation. Every subscription and delivery is
/// scoped to a tenant (an establishment), ensuring complete data isolation
/// between customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Creates a new random tenant ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for TenantId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for TenantId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for TenantId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed webhook subscription identifier.
///
/// Each subscription represents one tenant-configured destination URL with
/// its own event filter, payload format, and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Creates a new random subscription ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for SubscriptionId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for SubscriptionId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for SubscriptionId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed booking identifier.
///
/// Bookings themselves live in the host application; delivery logs carry
/// this ID so attempts can be traced back to the business record that
/// triggered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub Uuid);

impl BookingId {
    /// Creates a new random booking ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BookingId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for BookingId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for BookingId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for BookingId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Wire format for webhook payload bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// JSON envelope `{event, timestamp, data}`.
    Json,
    /// Two-line CSV: a header row and one data row.
    Csv,
}

impl PayloadFormat {
    /// Returns the database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Returns the Content-Type header value for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(format!("invalid payload format: {s}")),
        }
    }
}

impl sqlx::Type<PgDb> for PayloadFormat {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for PayloadFormat {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(Into::into)
    }
}

impl sqlx::Encode<'_, PgDb> for PayloadFormat {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <&str as sqlx::Encode<PgDb>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Tenant-configured webhook subscription.
///
/// Declares which event names a destination URL wants to receive, the wire
/// format, the signing secret, and the per-subscription retry policy.
/// Deactivated subscriptions are never attempted until manually re-enabled.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookSubscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// Owning tenant (establishment).
    pub tenant_id: TenantId,

    /// Human-readable label shown in the tenant's settings.
    pub name: String,

    /// Destination URL for POST requests.
    pub url: String,

    /// Event names this subscription receives, stored as JSONB.
    pub events: sqlx::types::Json<Vec<String>>,

    /// Wire format for payload bodies.
    pub format: PayloadFormat,

    /// Secret for HMAC-SHA256 signatures. None disables signing.
    pub signing_secret: Option<String>,

    /// Maximum delivery attempts per event. Values below 1 behave as 1.
    pub retry_count: i32,

    /// Base delay between attempts in seconds. Attempt n waits n times this.
    pub retry_delay_seconds: i32,

    /// Whether deliveries are currently attempted.
    pub is_active: bool,

    /// Consecutive fully-failed delivery chains. Reset on any success.
    pub consecutive_failures: i32,

    /// When this subscription was created.
    pub created_at: DateTime<Utc>,

    /// When this subscription was last updated.
    pub updated_at: DateTime<Utc>,

    /// When this subscription was automatically or manually deactivated.
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl WebhookSubscription {
    /// Default maximum delivery attempts.
    pub const DEFAULT_RETRY_COUNT: i32 = 3;
    /// Default base delay between attempts.
    pub const DEFAULT_RETRY_DELAY_SECONDS: i32 = 30;

    /// Creates a subscription with default retry policy, active, unsigned.
    pub fn new(tenant_id: TenantId, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SubscriptionId::new(),
            tenant_id,
            name: name.into(),
            url: url.into(),
            events: sqlx::types::Json(Vec::new()),
            format: PayloadFormat::Json,
            signing_secret: None,
            retry_count: Self::DEFAULT_RETRY_COUNT,
            retry_delay_seconds: Self::DEFAULT_RETRY_DELAY_SECONDS,
            is_active: true,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
            deactivated_at: None,
        }
    }

    /// Returns the subscribed event names.
    pub fn events(&self) -> &[String] {
        &self.events.0
    }

    /// Returns true if this subscription wants the named event.
    pub fn subscribes_to(&self, event_name: &str) -> bool {
        self.events.0.iter().any(|e| e == event_name)
    }
}

/// One immutable row per delivery attempt.
///
/// Append-only audit record. A status code of 0 marks a pure transport
/// failure where no HTTP response was received.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLog {
    /// Unique identifier for this attempt.
    pub id: Uuid,

    /// Subscription this attempt belongs to.
    pub webhook_id: SubscriptionId,

    /// Booking that triggered the event, when applicable.
    pub booking_id: Option<BookingId>,

    /// Event name that was delivered.
    pub event: String,

    /// Destination URL at the time of the attempt.
    pub url: String,

    /// Serialized payload body exactly as sent.
    pub payload: String,

    /// HTTP response status, or 0 when the request never completed.
    pub status_code: i32,

    /// Response body, truncated to the first 1000 characters.
    pub response_body: Option<String>,

    /// True only for 2xx responses.
    pub succeeded: bool,

    /// 1-based attempt number within the delivery chain.
    pub attempt_number: i32,

    /// Wall-clock duration of the request in milliseconds.
    pub duration_ms: i64,

    /// Transport error description when status_code is 0.
    pub error_message: Option<String>,

    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

/// Business event that triggers webhook deliveries.
///
/// Produced by the host application when a booking changes state. The
/// `data` value becomes the payload body after envelope wrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingEvent {
    /// Event name, e.g. "booking.created".
    pub name: String,

    /// Tenant whose subscriptions should receive this event.
    pub tenant_id: TenantId,

    /// Booking the event concerns, when applicable.
    pub booking_id: Option<BookingId>,

    /// Event payload data.
    pub data: serde_json::Value,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    /// Creates an event occurring now.
    pub fn new(name: impl Into<String>, tenant_id: TenantId, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            tenant_id,
            booking_id: None,
            data,
            occurred_at: Utc::now(),
        }
    }

    /// Attaches the booking that triggered this event.
    #[must_use]
    pub fn with_booking(mut self, booking_id: BookingId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_format_round_trips_through_str() {
        for format in [PayloadFormat::Json, PayloadFormat::Csv] {
            let parsed: PayloadFormat = format.as_str().parse().unwrap();
            assert_eq!(parsed, format);
        }
        assert!("xml".parse::<PayloadFormat>().is_err());
    }

    #[test]
    fn subscription_event_filter() {
        let mut sub = WebhookSubscription::new(TenantId::new(), "test", "https://example.com");
        sub.events = sqlx::types::Json(vec!["booking.created".to_string()]);

        assert!(sub.subscribes_to("booking.created"));
        assert!(!sub.subscribes_to("booking.cancelled"));
    }

    #[test]
    fn subscription_defaults() {
        let sub = WebhookSubscription::new(TenantId::new(), "test", "https://example.com");
        assert_eq!(sub.retry_count, 3);
        assert_eq!(sub.retry_delay_seconds, 30);
        assert!(sub.is_active);
        assert_eq!(sub.consecutive_failures, 0);
    }
}
