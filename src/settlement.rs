// src/settlement.rs

use crate::roster::Roster;
use crate::split::{self, SplitError};
use indexmap::{IndexMap, IndexSet};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The subset of participants sharing one line item's cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub item: String,
    pub price_incl_tax: Decimal,
    pub participants: IndexSet<String>,
}

impl Assignment {
    /// Equal per-participant share of this item.
    pub fn share(&self) -> Result<Decimal, SplitError> {
        split::split(self.price_incl_tax, self.participants.len())
    }
}

/// Per-participant amounts owed to the payer, plus what the payer
/// spent on themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// Every non-payer participant, in roster order. Zero entries are
    /// retained here; displays filter them out.
    pub owed: IndexMap<String, Decimal>,
    pub self_spend: Decimal,
}

impl Settlement {
    /// The entries that call for an actual repayment.
    pub fn debts(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.owed
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(name, amount)| (name.as_str(), *amount))
    }
}

/// Aggregate all item shares into what each participant owes the payer.
///
/// An assignment with no participants has no settlement effect: its
/// `SplitError` is absorbed here and the item is simply skipped. No
/// rounding happens in this function beyond what the shares carry.
pub fn settle<'a, I>(assignments: I, roster: &Roster, payer: &str) -> Settlement
where
    I: IntoIterator<Item = &'a Assignment>,
{
    let mut owed: IndexMap<String, Decimal> = roster
        .names()
        .filter(|name| *name != payer)
        .map(|name| (name.to_string(), Decimal::ZERO))
        .collect();
    let mut self_spend = Decimal::ZERO;

    for assignment in assignments {
        let Ok(share) = assignment.share() else {
            continue;
        };

        for participant in &assignment.participants {
            if participant == payer {
                self_spend += share;
            } else {
                *owed.entry(participant.clone()).or_insert(Decimal::ZERO) += share;
            }
        }
    }

    Settlement { owed, self_spend }
}
