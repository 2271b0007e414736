//! Candidate matching and amount-variance classification.

use crate::models::{GrnLineItem, Invoice, MatchStatus, MatchTier};
use crate::services::database::RecordStore;
use rust_decimal::Decimal;
use service_core::error::AppError;

/// GRN rows selected as relevant to one invoice, tagged with the lookup tier
/// that produced them.
#[derive(Debug)]
pub struct CandidateSet {
    pub items: Vec<GrnLineItem>,
    pub tier: MatchTier,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Find the GRN rows an invoice should reconcile against.
///
/// Tiers are tried in order and the first non-empty one wins: exact
/// (PO + GRN number), then PO alone. No fuzzy matching, no cross-PO
/// fallback. An empty result means "no GRN found" and is not an error.
pub async fn find_candidates(
    store: &dyn RecordStore,
    invoice: &Invoice,
) -> Result<CandidateSet, AppError> {
    if let (Some(po), Some(grn)) = (invoice.po_number(), invoice.grn_number()) {
        let items = store.find_grn_by_po_and_grn(po, grn).await?;
        if !items.is_empty() {
            return Ok(CandidateSet {
                items,
                tier: MatchTier::PoAndGrn,
            });
        }
    }

    if let Some(po) = invoice.po_number() {
        let items = store.find_grn_by_po(po).await?;
        let tier = if items.is_empty() {
            MatchTier::None
        } else {
            MatchTier::PoOnly
        };
        return Ok(CandidateSet { items, tier });
    }

    Ok(CandidateSet {
        items: Vec::new(),
        tier: MatchTier::None,
    })
}

/// Result of the deterministic amount comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarianceBreakdown {
    pub status: MatchStatus,
    pub variance_pct: Decimal,
    pub invoice_total: Decimal,
    pub grn_total: Decimal,
    pub line_count: usize,
}

/// Compare the invoice total against the aggregated GRN total.
///
/// A zero or absent invoice total classifies as a maximal mismatch with the
/// variance pinned at exactly 100; the thresholds depend on that convention.
pub fn classify_variance(
    invoice_total: Option<Decimal>,
    grn_items: &[GrnLineItem],
) -> VarianceBreakdown {
    let grn_total: Decimal = grn_items
        .iter()
        .map(|item| item.total.unwrap_or_default())
        .sum();
    let invoice_total = invoice_total.unwrap_or_default();

    let variance_pct = if invoice_total > Decimal::ZERO {
        ((invoice_total - grn_total) / invoice_total * Decimal::from(100)).abs()
    } else {
        Decimal::from(100)
    };

    let status = if variance_pct <= Decimal::from(2) {
        MatchStatus::PerfectMatch
    } else if variance_pct <= Decimal::from(10) {
        MatchStatus::PartialMatch
    } else {
        MatchStatus::AmountMismatch
    };

    VarianceBreakdown {
        status,
        variance_pct,
        invoice_total,
        grn_total,
        line_count: grn_items.len(),
    }
}
