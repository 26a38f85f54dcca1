use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};

use crate::models::{PoItem, ProjectEstimate};

/// Shortfall below the estimate still treated as "nearly matched".
pub const QUANTITY_TOLERANCE: Decimal = dec!(5);

/// Ordered quantity compared against the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum QuantityClass {
    Over,
    /// Under the estimate by less than [`QUANTITY_TOLERANCE`]
    NearlyMatched,
    Exact,
    /// Under the estimate by [`QUANTITY_TOLERANCE`] or more
    Under,
}

impl QuantityClass {
    pub fn classify(ordered: Decimal, estimated: Decimal) -> Self {
        if ordered > estimated {
            QuantityClass::Over
        } else if ordered == estimated {
            QuantityClass::Exact
        } else if estimated - ordered < QUANTITY_TOLERANCE {
            QuantityClass::NearlyMatched
        } else {
            QuantityClass::Under
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemVariance {
    pub item_id: String,
    pub item_name: String,
    pub quantity: Decimal,
    pub amount: Decimal,
    pub estimate_quantity: Option<Decimal>,
    /// `None` when the item has no estimate
    pub class: Option<QuantityClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: Decimal,
    pub estimate_amount: Decimal,
    pub items: Vec<ItemVariance>,
}

impl CategoryTotal {
    /// Positive when spend exceeds the estimate.
    pub fn variance(&self) -> Decimal {
        self.amount - self.estimate_amount
    }
}

/// Groups PO lines by category and sets each group against its estimates.
///
/// Categories that only appear in the estimates are included with a zero amount.
pub fn category_totals(items: &[PoItem], estimates: &[ProjectEstimate]) -> Vec<CategoryTotal> {
    let mut groups: BTreeMap<&str, CategoryTotal> = BTreeMap::new();

    for estimate in estimates {
        let group = groups
            .entry(estimate.category.as_str())
            .or_insert_with(|| empty_group(&estimate.category));
        group.estimate_amount += estimate.amount();
    }

    for line in items {
        let group = groups
            .entry(line.category.as_str())
            .or_insert_with(|| empty_group(&line.category));
        group.amount += line.amount();

        match group.items.iter_mut().find(|v| v.item_id == line.name) {
            Some(existing) => {
                existing.quantity += line.quantity;
                existing.amount += line.amount();
            }
            None => group.items.push(ItemVariance {
                item_id: line.name.clone(),
                item_name: line.item.clone(),
                quantity: line.quantity,
                amount: line.amount(),
                estimate_quantity: None,
                class: None,
            }),
        }
    }

    for group in groups.values_mut() {
        for variance in group.items.iter_mut() {
            let estimated: Option<Decimal> = estimates
                .iter()
                .filter(|e| e.category == group.category && e.item == variance.item_id)
                .map(|e| e.quantity_estimate)
                .reduce(|a, b| a + b);
            variance.estimate_quantity = estimated;
            variance.class = estimated.map(|e| QuantityClass::classify(variance.quantity, e));
        }
    }

    groups.into_values().collect()
}

fn empty_group(category: &str) -> CategoryTotal {
    CategoryTotal {
        category: category.to_string(),
        amount: Decimal::ZERO,
        estimate_amount: Decimal::ZERO,
        items: Vec::new(),
    }
}
