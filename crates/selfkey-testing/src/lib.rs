//! Shared fixtures for integration tests across the SelfKey crates.
//!
//! Builders here produce valid domain objects with sensible defaults so
//! tests only spell out the fields they care about.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;

pub use fixtures::{booking_completed, SubscriptionBuilder};
