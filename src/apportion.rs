// src/apportion.rs

use crate::money;
use crate::parser::{ParsedItem, TaxSummary};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A line item with its share of the invoice tax folded in.
///
/// Immutable once built: a new extraction supersedes the whole list,
/// items are never merged across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_amount: Decimal,
    pub price_incl_tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApportionError {
    #[error("zero subtotal, cannot apportion tax")]
    ZeroSubtotal,
}

/// Distribute the invoice-level tax across line items, proportionally
/// to each line's pre-tax total.
///
/// Each item's tax is rounded to currency precision on its own, so the
/// per-item taxes may drift from the reported total by a few cents.
/// That slack is accepted, not corrected.
pub fn apportion(
    items: Vec<ParsedItem>,
    summary: &TaxSummary,
) -> Result<Vec<LineItem>, ApportionError> {
    let subtotal: Decimal = items
        .iter()
        .map(|item| Decimal::from(item.quantity) * item.unit_price)
        .sum();

    if subtotal.is_zero() {
        return Err(ApportionError::ZeroSubtotal);
    }

    let tax_rate = summary.total_tax / subtotal;

    Ok(items
        .into_iter()
        .map(|item| {
            let line_total = Decimal::from(item.quantity) * item.unit_price;
            let tax_amount = money::round_currency(line_total * tax_rate);
            let price_incl_tax = money::round_currency(line_total + tax_amount);
            LineItem {
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                tax_amount,
                price_incl_tax,
            }
        })
        .collect())
}
