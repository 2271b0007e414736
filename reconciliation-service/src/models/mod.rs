//! Domain models for reconciliation-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Invoice Models
// ============================================================================

/// Extraction lifecycle of an invoice. Only `completed` invoices are
/// eligible for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Invoice header extracted from a vendor attachment. Owned by the ingestion
/// pipeline; read-only here.
#[derive(Debug, Clone, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub po_number: Option<String>,
    pub grn_number: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub vendor_name: Option<String>,
    pub vendor_gst: Option<String>,
    pub vendor_pan: Option<String>,
    pub invoice_value_without_gst: Option<Decimal>,
    pub cgst_amount: Option<Decimal>,
    pub sgst_amount: Option<Decimal>,
    pub igst_amount: Option<Decimal>,
    pub total_gst_amount: Option<Decimal>,
    pub invoice_total_post_gst: Option<Decimal>,
    pub processing_status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// PO number, treating an empty string the same as an absent one.
    pub fn po_number(&self) -> Option<&str> {
        self.po_number.as_deref().filter(|s| !s.is_empty())
    }

    /// GRN number, treating an empty string the same as an absent one.
    pub fn grn_number(&self) -> Option<&str> {
        self.grn_number.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceLineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub item_sequence: i32,
    pub item_description: String,
    pub hsn_code: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_of_measurement: Option<String>,
    pub unit_price: Option<Decimal>,
    pub invoice_value_item_wise: Option<Decimal>,
    pub cgst_rate: Option<Decimal>,
    pub cgst_amount: Option<Decimal>,
    pub sgst_rate: Option<Decimal>,
    pub sgst_amount: Option<Decimal>,
    pub igst_rate: Option<Decimal>,
    pub igst_amount: Option<Decimal>,
    pub total_tax_amount: Option<Decimal>,
    pub item_total_amount: Option<Decimal>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// GRN Models
// ============================================================================

/// One item-wise GRN row as uploaded from the warehouse export. Many rows can
/// share a PO number; an invoice reconciles against a set of them.
#[derive(Debug, Clone, FromRow)]
pub struct GrnLineItem {
    pub grn_line_item_id: Uuid,
    pub s_no: i32,
    pub po_number: Option<String>,
    pub grn_number: Option<String>,
    pub sku_code: Option<String>,
    pub item_name: Option<String>,
    pub hsn_code: Option<String>,
    pub unit: Option<String>,
    pub received_qty: Option<Decimal>,
    pub returned_qty: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub subtotal: Option<Decimal>,
    pub cgst_rate: Option<Decimal>,
    pub cgst_amount: Option<Decimal>,
    pub sgst_rate: Option<Decimal>,
    pub sgst_amount: Option<Decimal>,
    pub igst_rate: Option<Decimal>,
    pub igst_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total: Option<Decimal>,
    pub supplier: Option<String>,
    pub pickup_location: Option<String>,
    pub pickup_gstin: Option<String>,
    pub seller_invoice_no: Option<String>,
    pub supplier_invoice_date: Option<NaiveDate>,
    pub grn_created_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Reconciliation Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    PerfectMatch,
    PartialMatch,
    AmountMismatch,
    NoGrnFound,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerfectMatch => "perfect_match",
            Self::PartialMatch => "partial_match",
            Self::AmountMismatch => "amount_mismatch",
            Self::NoGrnFound => "no_grn_found",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "perfect_match" => Self::PerfectMatch,
            "partial_match" => Self::PartialMatch,
            "amount_mismatch" => Self::AmountMismatch,
            "no_grn_found" => Self::NoGrnFound,
            _ => Self::NoGrnFound,
        }
    }
}

/// Which lookup tier produced the candidate GRN set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    PoAndGrn,
    PoOnly,
    None,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PoAndGrn => "po_and_grn",
            Self::PoOnly => "po_only",
            Self::None => "none",
        }
    }
}

/// Append-only audit row, one per invoice considered. PO/GRN/invoice numbers
/// are copied at reconciliation time so the row stays meaningful even if the
/// source records change later.
#[derive(Debug, Clone, FromRow)]
pub struct ReconciliationRecord {
    pub reconciliation_id: Uuid,
    pub invoice_id: Uuid,
    pub po_number: String,
    pub grn_number: Option<String>,
    pub invoice_number: Option<String>,
    pub match_status: String,
    pub invoice_total: Option<Decimal>,
    pub grn_total: Option<Decimal>,
    pub total_variance_pct: Option<Decimal>,
    pub total_grn_line_items: i32,
    pub is_auto_matched: bool,
    pub matching_method: String,
    pub reconciliation_notes: Option<String>,
    pub requires_review: bool,
    pub reconciled_utc: DateTime<Utc>,
}

/// Insert payload for a reconciliation record. Required fields are plain,
/// optional ones are `Option`; no loosely-typed maps.
#[derive(Debug, Clone)]
pub struct NewReconciliationRecord {
    pub invoice_id: Uuid,
    pub po_number: String,
    pub grn_number: Option<String>,
    pub invoice_number: Option<String>,
    pub match_status: MatchStatus,
    pub invoice_total: Option<Decimal>,
    pub grn_total: Option<Decimal>,
    pub total_variance_pct: Option<Decimal>,
    pub total_grn_line_items: i32,
    pub is_auto_matched: bool,
    pub matching_method: MatchTier,
    pub reconciliation_notes: Option<String>,
    pub requires_review: bool,
}

/// Per-status row for the status endpoint's GROUP BY breakdown.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchStatusCount {
    pub match_status: String,
    pub count: i64,
}

// ============================================================================
// Batch Run Models
// ============================================================================

/// Counters for one orchestration run. Built by merging per-invoice outcomes
/// after each batch barrier; reset on every run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total_processed: u64,
    pub perfect_matches: u64,
    pub partial_matches: u64,
    pub llm_matches: u64,
    pub no_matches: u64,
    pub errors: u64,
}

impl BatchStats {
    /// Fold one successfully processed invoice into the counters.
    pub fn record_outcome(&mut self, outcome: &InvoiceOutcome) {
        self.total_processed += 1;
        match MatchStatus::from_str(&outcome.match_status) {
            MatchStatus::PerfectMatch => self.perfect_matches += 1,
            MatchStatus::PartialMatch => self.partial_matches += 1,
            MatchStatus::NoGrnFound => self.no_matches += 1,
            MatchStatus::AmountMismatch => {}
        }
        if outcome.analysis_discrepancies.is_some() {
            self.llm_matches += 1;
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }
}

/// What one per-invoice task reports back to the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceOutcome {
    pub invoice_id: Uuid,
    pub reconciliation_id: Uuid,
    pub match_status: String,
    pub variance_pct: Decimal,
    /// Discrepancy count from the field-by-field analysis, when it ran.
    pub analysis_discrepancies: Option<usize>,
}
