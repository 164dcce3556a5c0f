// src/split.rs

use crate::money;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("no participants assigned")]
    NoParticipants,
}

/// Equal share of a tax-inclusive price across the assigned
/// participants, rounded to currency precision (round-half-up, see
/// `money`).
///
/// Because each share is rounded independently, `share × count` can
/// differ from the price by up to `count − 1` cents. The slack is never
/// redistributed.
pub fn split(price_incl_tax: Decimal, assigned_count: usize) -> Result<Decimal, SplitError> {
    if assigned_count == 0 {
        return Err(SplitError::NoParticipants);
    }
    Ok(money::round_currency(
        price_incl_tax / Decimal::from(assigned_count as u64),
    ))
}
