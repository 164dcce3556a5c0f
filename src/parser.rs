// src/parser.rs

use crate::money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One product as reported by the extraction service, before any tax
/// has been apportioned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub name: String,
    pub quantity: u32,
    /// Pre-tax, post-discount price per unit.
    pub unit_price: Decimal,
}

/// Invoice-level totals reported alongside the line items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub total_before_tax: Decimal,
    pub total_tax: Decimal,
    pub total_after_tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed envelope: {0:?}")]
    MalformedEnvelope(String),
    #[error("expected name, quantity, price in {0:?}")]
    ItemFieldCount(String),
    #[error("empty product name in {0:?}")]
    EmptyName(String),
    #[error("quantity is not a positive integer in {0:?}")]
    InvalidQuantity(String),
    #[error("price is not a non-negative decimal in {0:?}")]
    InvalidPrice(String),
    #[error("duplicate product name {0:?}")]
    DuplicateName(String),
    #[error("expected before-tax, tax, after-tax totals in {0:?}")]
    SummaryFieldCount(String),
    #[error("summary total is not a non-negative decimal in {0:?}")]
    InvalidSummaryTotal(String),
}

/// Parse the encoded extraction response into line items and totals.
///
/// The response is two bracketed groups:
/// `[Name, Qty, Price; ...][Before, Tax, After]`. Whitespace around any
/// field is insignificant. Nothing partial ever escapes this function:
/// the first offending segment aborts the whole parse.
pub fn parse(raw: &str) -> Result<(Vec<ParsedItem>, TaxSummary), ParseError> {
    let trimmed = raw.trim();
    let inner = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let inner = inner.strip_suffix(']').unwrap_or(inner);

    let segments: Vec<&str> = inner.split("][").collect();
    let [items_segment, summary_segment] = segments[..] else {
        return Err(ParseError::MalformedEnvelope(trimmed.to_string()));
    };

    let items = parse_items(items_segment)?;
    let summary = parse_summary(summary_segment)?;
    Ok((items, summary))
}

/// Parse the `;`-separated item list. A single product still goes
/// through the same path and yields a one-element list.
fn parse_items(segment: &str) -> Result<Vec<ParsedItem>, ParseError> {
    let mut items = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for item_str in segment.split(';') {
        let fields: Vec<&str> = item_str.split(',').collect();
        let [name, quantity, price] = fields[..] else {
            return Err(ParseError::ItemFieldCount(item_str.trim().to_string()));
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::EmptyName(item_str.trim().to_string()));
        }
        // The encoding has no item identifier, so downstream assignment
        // keys on the name. Two items with the same name would be
        // conflated there; reject the invoice instead.
        if !seen.insert(name.to_string()) {
            return Err(ParseError::DuplicateName(name.to_string()));
        }

        let quantity: u32 = quantity
            .trim()
            .parse()
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| ParseError::InvalidQuantity(item_str.trim().to_string()))?;

        let unit_price = money::parse_amount(price)
            .ok_or_else(|| ParseError::InvalidPrice(item_str.trim().to_string()))?;

        items.push(ParsedItem {
            name: name.to_string(),
            quantity,
            unit_price,
        });
    }

    Ok(items)
}

fn parse_summary(segment: &str) -> Result<TaxSummary, ParseError> {
    let fields: Vec<&str> = segment.split(',').collect();
    let [before, tax, after] = fields[..] else {
        return Err(ParseError::SummaryFieldCount(segment.trim().to_string()));
    };

    // The model occasionally leaves stray brackets on the summary
    // fields; strip them along with whitespace.
    let clean = |field: &str| -> Result<Decimal, ParseError> {
        let stripped = field.trim_matches(|c: char| c.is_whitespace() || c == '[' || c == ']');
        money::parse_amount(stripped)
            .ok_or_else(|| ParseError::InvalidSummaryTotal(field.trim().to_string()))
    };

    Ok(TaxSummary {
        total_before_tax: clean(before)?,
        total_tax: clean(tax)?,
        total_after_tax: clean(after)?,
    })
}
