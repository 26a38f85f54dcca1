//! Order totals, recomputed from line items on every read.
//!
//! Persisted totals on the server are never trusted over these sums. All
//! arithmetic is in [`Decimal`]; rounding happens only in
//! [`format_inr`](crate::common::format_inr).

use chrono::{Months, NaiveDateTime};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::models::{ApprovedQuotation, PoItem, ProcurementRequest, ServiceRequest};
use crate::store::{DocumentStore, DocumentStoreExt, Filter, ListQuery, SortOrder};

/// Quotes older than this are ignored when estimating unquoted lines.
pub const QUOTE_LOOKBACK_MONTHS: u32 = 3;

const SERVICE_GST_RATE: Decimal = dec!(0.18);

/// The historical quote that priced an unquoted PR line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsedQuote {
    pub quote: ApprovedQuotation,
    /// Unit price taken from `quote`
    pub amount: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PrTotal {
    pub total: Decimal,
    #[serde(rename = "usedQuotes")]
    pub used_quotes: BTreeMap<String, UsedQuote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoTotals {
    pub excl_gst: Decimal,
    pub incl_gst: Decimal,
}

impl PoTotals {
    pub fn gst(&self) -> Decimal {
        self.incl_gst - self.excl_gst
    }
}

/// Lowest approved quote for `item_id` modified within the lookback window
/// ending at `now`. Ties go to the most recent quote.
pub fn lowest_recent_quote<'a>(
    item_id: &str,
    quotes: &'a [ApprovedQuotation],
    now: NaiveDateTime,
) -> Option<&'a ApprovedQuotation> {
    let cutoff = now.checked_sub_months(Months::new(QUOTE_LOOKBACK_MONTHS))?;
    quotes
        .iter()
        .filter(|q| q.item_id == item_id && q.modified >= cutoff && q.modified <= now)
        .min_by(|a, b| a.quote.cmp(&b.quote).then(b.modified.cmp(&a.modified)))
}

/// Total of a procurement request.
///
/// Lines still in `Request` status are skipped. A line without its own quote
/// is priced at the lowest recent approved quote; lines with neither count 0.
pub fn pr_total(pr: &ProcurementRequest, quotes: &[ApprovedQuotation], now: NaiveDateTime) -> PrTotal {
    let mut result = PrTotal::default();
    for item in pr.progressed_items() {
        if let Some(quote) = item.quote {
            result.total += quote * item.quantity;
            continue;
        }
        if let Some(best) = lowest_recent_quote(&item.name, quotes, now) {
            result.total += best.quote * item.quantity;
            result.used_quotes.insert(
                item.name.clone(),
                UsedQuote {
                    quote: best.clone(),
                    amount: best.quote,
                    quantity: item.quantity,
                },
            );
        }
    }
    result
}

/// Excl. GST is Σ quantity×quote; incl. GST is Σ quantity×quote×(1 + tax/100).
pub fn po_totals(order_list: &[PoItem]) -> PoTotals {
    order_list.iter().fold(PoTotals::default(), |acc, line| {
        let amount = line.amount();
        PoTotals {
            excl_gst: acc.excl_gst + amount,
            incl_gst: acc.incl_gst + amount * (Decimal::ONE + line.tax / dec!(100)),
        }
    })
}

/// Service request totals; 18% GST applies to the whole order when flagged.
pub fn sr_totals(sr: &ServiceRequest) -> PoTotals {
    let excl_gst: Decimal = sr
        .service_order_list
        .iter()
        .map(|line| line.quantity * line.rate.unwrap_or_default())
        .sum();
    let incl_gst = if sr.gst_applicable() {
        excl_gst * (Decimal::ONE + SERVICE_GST_RATE)
    } else {
        excl_gst
    };
    PoTotals { excl_gst, incl_gst }
}

/// Loads a PR and the approved quotations for its lines, then totals it.
#[instrument(skip(store))]
pub async fn load_pr_total(
    store: &dyn DocumentStore,
    pr_name: &str,
    now: NaiveDateTime,
) -> Result<PrTotal, ServiceError> {
    let pr: ProcurementRequest = store.fetch(pr_name).await?;
    let item_ids: Vec<String> = pr
        .progressed_items()
        .filter(|item| item.quote.is_none())
        .map(|item| item.name.clone())
        .collect();
    let quotes: Vec<ApprovedQuotation> = if item_ids.is_empty() {
        Vec::new()
    } else {
        store
            .fetch_list(
                &ListQuery::new()
                    .filter(Filter::is_in("item_id", item_ids))
                    .order_by("modified", SortOrder::Desc),
            )
            .await?
    };
    debug!(quotes = quotes.len(), "Loaded approved quotations");
    Ok(pr_total(&pr, &quotes, now))
}

/// Memoizes totals per document; an entry is reused only while the
/// document's `modified` stamp is unchanged.
#[derive(Debug)]
pub struct TotalsMemo<T> {
    entries: DashMap<String, (Option<String>, T)>,
}

impl<T> Default for TotalsMemo<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> TotalsMemo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(&self, id: &str, modified: Option<&str>, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(entry) = self.entries.get(id) {
            if entry.0.as_deref() == modified {
                return entry.1.clone();
            }
        }
        let value = compute();
        self.entries
            .insert(id.to_string(), (modified.map(str::to_string), value.clone()));
        value
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
