//! Fixed-point-safe currency arithmetic over decimal amounts.
//!
//! Amounts cross API boundaries as `f64` with two decimal places, but every
//! operation here converts to integer minor units (cents) before doing any
//! math. Adding 0.1 and 0.2 yields exactly 0.3.
//!
//! All functions are total over finite inputs. Passing NaN or infinity is a
//! caller contract violation.

use serde::{Deserialize, Serialize};

/// Minor units per major currency unit.
const MINOR_UNITS_PER_UNIT: f64 = 100.0;

/// Converts a decimal amount to integer minor units, rounding to the
/// nearest unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * MINOR_UNITS_PER_UNIT).round() as i64
}

/// Converts integer minor units back to a decimal amount.
pub fn from_minor_units(units: i64) -> f64 {
    units as f64 / MINOR_UNITS_PER_UNIT
}

/// Sums amounts in the integer domain.
///
/// `add_money(&[0.1, 0.2])` is exactly `0.3`, unlike naive float addition.
pub fn add_money(amounts: &[f64]) -> f64 {
    let total: i64 = amounts.iter().map(|&a| to_minor_units(a)).sum();
    from_minor_units(total)
}

/// Multiplies an amount by a factor in the integer domain.
///
/// The factor itself is not quantized, only the result is.
pub fn multiply_money(amount: f64, factor: f64) -> f64 {
    let units = to_minor_units(amount);
    from_minor_units((units as f64 * factor).round() as i64)
}

/// Computes a percentage of an amount in the integer domain.
pub fn percentage_of(amount: f64, percent: f64) -> f64 {
    multiply_money(amount, percent / 100.0)
}

/// Commission split for a payment-processor payout.
///
/// Derived from the booking amount at charge time; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionBreakdown {
    /// Amount the guest was charged.
    pub original_amount: f64,
    /// Percentage-based commission portion.
    pub commission: f64,
    /// Flat fee portion.
    pub fixed_fee: f64,
    /// Commission plus fixed fee.
    pub total_commission: f64,
    /// What the establishment receives. Never negative.
    pub net_amount: f64,
    /// Original amount in minor units, for processor APIs.
    pub amount_minor_units: i64,
    /// Total commission in minor units, for processor APIs.
    pub commission_minor_units: i64,
}

/// Splits an amount into commission and net payout.
///
/// The net amount is clamped at zero when fees exceed the charge.
///
/// ```
/// use selfkey_pricing::money::calculate_commission;
///
/// let breakdown = calculate_commission(150.0, 5.0, 3.0);
/// assert_eq!(breakdown.commission, 7.5);
/// assert_eq!(breakdown.total_commission, 10.5);
/// assert_eq!(breakdown.net_amount, 139.5);
/// ```
pub fn calculate_commission(amount: f64, percent: f64, fixed_fee: f64) -> CommissionBreakdown {
    let amount_units = to_minor_units(amount);
    let commission_units = (amount_units as f64 * percent / 100.0).round() as i64;
    let fee_units = to_minor_units(fixed_fee);
    let total_units = commission_units + fee_units;
    let net_units = (amount_units - total_units).max(0);

    CommissionBreakdown {
        original_amount: from_minor_units(amount_units),
        commission: from_minor_units(commission_units),
        fixed_fee: from_minor_units(fee_units),
        total_commission: from_minor_units(total_units),
        net_amount: from_minor_units(net_units),
        amount_minor_units: amount_units,
        commission_minor_units: total_units,
    }
}

/// Formats an amount with exactly two decimals and thousands separators.
///
/// `format_currency(1234567.8)` is `"1,234,567.80"`.
pub fn format_currency(amount: f64) -> String {
    let units = to_minor_units(amount);
    let negative = units < 0;
    let abs = units.unsigned_abs();
    let whole = abs / 100;
    let cents = abs % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped}.{cents:02}")
}
