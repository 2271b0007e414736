//! Integration tests for the tiered candidate matcher.

mod common;

use common::{completed_invoice, grn_row, init_tracing, MemoryStore};
use reconciliation_service::models::MatchTier;
use reconciliation_service::services::matching::find_candidates;

#[tokio::test]
async fn invoice_without_po_yields_empty_candidate_set() {
    init_tracing();
    let store = MemoryStore::new().with_grn_item(grn_row("PO-1", Some("GRN-1"), 100));
    let invoice = completed_invoice(None, None, 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert!(candidates.is_empty());
    assert_eq!(candidates.tier, MatchTier::None);
}

#[tokio::test]
async fn exact_tier_wins_and_never_falls_through() {
    init_tracing();
    // Two exact rows plus an extra row on the same PO under another GRN.
    let store = MemoryStore::new()
        .with_grn_item(grn_row("PO-1", Some("GRN-1"), 40))
        .with_grn_item(grn_row("PO-1", Some("GRN-1"), 60))
        .with_grn_item(grn_row("PO-1", Some("GRN-2"), 999));
    let invoice = completed_invoice(Some("PO-1"), Some("GRN-1"), 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert_eq!(candidates.items.len(), 2);
    assert_eq!(candidates.tier, MatchTier::PoAndGrn);
    assert!(candidates
        .items
        .iter()
        .all(|i| i.grn_number.as_deref() == Some("GRN-1")));
}

#[tokio::test]
async fn empty_exact_tier_falls_through_to_po_only() {
    init_tracing();
    let store = MemoryStore::new()
        .with_grn_item(grn_row("PO-1", Some("GRN-2"), 40))
        .with_grn_item(grn_row("PO-1", Some("GRN-3"), 60));
    let invoice = completed_invoice(Some("PO-1"), Some("GRN-1"), 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert_eq!(candidates.items.len(), 2);
    assert_eq!(candidates.tier, MatchTier::PoOnly);
}

#[tokio::test]
async fn po_only_tier_used_when_invoice_has_no_grn_number() {
    init_tracing();
    let store = MemoryStore::new()
        .with_grn_item(grn_row("PO-1", Some("GRN-1"), 40))
        .with_grn_item(grn_row("PO-2", Some("GRN-2"), 60));
    let invoice = completed_invoice(Some("PO-1"), None, 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert_eq!(candidates.items.len(), 1);
    assert_eq!(candidates.tier, MatchTier::PoOnly);
}

#[tokio::test]
async fn unknown_po_returns_empty_without_error() {
    init_tracing();
    let store = MemoryStore::new().with_grn_item(grn_row("PO-1", Some("GRN-1"), 100));
    let invoice = completed_invoice(Some("PO-404"), None, 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert!(candidates.is_empty());
    assert_eq!(candidates.tier, MatchTier::None);
}

#[tokio::test]
async fn blank_po_number_is_treated_as_absent() {
    init_tracing();
    let store = MemoryStore::new().with_grn_item(grn_row("", Some("GRN-1"), 100));
    let invoice = completed_invoice(Some(""), Some("GRN-1"), 100);

    let candidates = find_candidates(&store, &invoice).await.unwrap();

    assert!(candidates.is_empty());
}
