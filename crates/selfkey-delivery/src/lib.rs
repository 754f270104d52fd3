//! Webhook notification delivery for the SelfKey booking platform.
//!
//! Fans booking events out to tenant-configured endpoints with linear
//! backoff retry, optional HMAC-SHA256 signing, JSON or CSV payloads, and
//! one immutable audit row per attempt. Delivery is best effort and
//! at-least-once per attempt budget; failures never propagate back to the
//! business operation that raised the event.
//!
//! Retry state lives in memory only. A process restart abandons in-flight
//! chains; the audit log shows how far each one got.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod retry;
pub mod signature;
pub mod storage;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse};
pub use dispatcher::{DeliveryReport, Dispatcher, DispatcherConfig, DEFAULT_AUTO_DISABLE_THRESHOLD};
pub use error::{DeliveryError, Result};
pub use payload::build_payload;
pub use retry::{RetryDecision, RetryPolicy};
pub use signature::{sign_payload, verify_signature};
pub use storage::{DeliveryStore, PostgresDeliveryStore};
