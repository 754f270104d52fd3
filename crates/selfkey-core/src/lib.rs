//! Core domain models and persistence for the SelfKey booking platform.
//!
//! Provides strongly-typed identifiers, the webhook subscription and delivery
//! log entities, the error taxonomy, and the PostgreSQL repository layer that
//! the pricing and delivery crates build on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    BookingEvent, BookingId, DeliveryLog, PayloadFormat, SubscriptionId, TenantId,
    WebhookSubscription,
};
pub use time::{Clock, RealClock, TestClock};
