// src/money.rs

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places every monetary amount is rounded to.
pub const CURRENCY_DP: u32 = 2;

/// Round an amount to currency precision.
///
/// The crate-wide rounding rule is round-half-up
/// (`MidpointAwayFromZero`); every rounding site goes through here so
/// the rule cannot drift between modules.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a non-negative decimal amount from a raw text field.
///
/// Returns `None` for anything that is not a decimal literal or that is
/// negative. The result is already rounded to currency precision.
pub fn parse_amount(field: &str) -> Option<Decimal> {
    let amount: Decimal = field.trim().parse().ok()?;
    if amount.is_sign_negative() {
        return None;
    }
    Some(round_currency(amount))
}
