//! Money calculation utilities using rust_decimal for precision
//!
//! All monetary values are `Decimal`, rounded to 2 decimal places with
//! half-up rounding where a rounding step is specified. Comparisons
//! against external amounts use a fixed absolute tolerance.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounding: 2 decimal places, half-up
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for reconciling externally reported amounts (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round a monetary value to 2 decimal places, half-up
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Line total: unit price × quantity, rounded
#[inline]
pub fn line_total(unit_price: Decimal, quantity: i64) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Tax amount: subtotal × rate, rounded half-up
#[inline]
pub fn compute_tax(subtotal: Decimal, tax_rate: Decimal) -> Decimal {
    round_money(subtotal * tax_rate)
}

/// Absolute-tolerance equality for external amounts
pub fn within_tolerance(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= MONEY_TOLERANCE
}
