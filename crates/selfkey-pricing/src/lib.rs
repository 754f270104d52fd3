//! Money arithmetic and pricing-option snapshots.
//!
//! All currency math routes through integer minor units so that sums of
//! customer-facing amounts never drift (`0.1 + 0.2 == 0.3`). Pricing options
//! chosen at booking time are frozen into self-describing records that
//! survive later catalog edits.
//!
//! This crate is pure and synchronous; it holds no runtime state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod money;
pub mod options;

pub use money::{
    add_money, calculate_commission, format_currency, from_minor_units, multiply_money,
    percentage_of, to_minor_units, CommissionBreakdown,
};
pub use options::{
    compress_selections, enrich_selections, enriched_total, flatten, is_enriched_format,
    CompactSelection, CompactSelections, EnrichedSelection, EnrichedSelections, EnrichedValue,
    OptionType, PricingOption, PricingOptionValue,
};
