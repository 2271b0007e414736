//! Batch reconciliation orchestration.
//!
//! Drives one run: select eligible invoices, partition into batches, process
//! each batch's invoices concurrently under a shared semaphore, and persist
//! exactly one reconciliation record per invoice, including the no-match
//! case. One invoice's failure never aborts the run.

use crate::models::{
    BatchStats, Invoice, InvoiceOutcome, MatchStatus, MatchTier, NewReconciliationRecord,
};
use crate::services::analyzer::{
    AnalysisOutcome, DiscrepancyAnalyzer, MAX_GRN_ITEMS_FOR_ANALYSIS,
};
use crate::services::database::RecordStore;
use crate::services::{matching, metrics};
use futures::future::join_all;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Notes column keeps at most this much of the analysis prose.
const NOTES_SUMMARY_LIMIT: usize = 200;

/// Validated parameters for one reconciliation run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub invoice_ids: Option<Vec<Uuid>>,
    pub delay_seconds: f64,
    pub max_concurrent: usize,
    pub batch_size: usize,
}

/// Result of a completed run.
#[derive(Debug)]
pub struct RunOutcome {
    pub total_processed: u64,
    pub stats: BatchStats,
    pub results: Vec<InvoiceOutcome>,
}

/// Run-level failure. Only invoice selection can fail a run; the stats
/// accumulated so far (usually empty) ride along so callers always have them.
#[derive(Debug)]
pub struct RunError {
    pub source: AppError,
    pub stats: BatchStats,
}

pub struct ReconciliationRunner {
    store: Arc<dyn RecordStore>,
    analyzer: Option<DiscrepancyAnalyzer>,
}

impl ReconciliationRunner {
    pub fn new(store: Arc<dyn RecordStore>, analyzer: Option<DiscrepancyAnalyzer>) -> Self {
        Self { store, analyzer }
    }

    pub async fn run(&self, params: &RunParams) -> Result<RunOutcome, RunError> {
        let mut stats = BatchStats::default();

        info!(
            delay_seconds = params.delay_seconds,
            max_concurrent = params.max_concurrent,
            batch_size = params.batch_size,
            restricted = params.invoice_ids.is_some(),
            "Starting reconciliation run"
        );

        let invoices = self
            .store
            .list_completed_invoices(params.invoice_ids.as_deref())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to select invoices for reconciliation");
                RunError {
                    source: e,
                    stats: stats.clone(),
                }
            })?;

        let total_invoices = invoices.len();
        let total_batches = total_invoices.div_ceil(params.batch_size.max(1));
        info!(total_invoices = total_invoices, "Processing invoices");

        // One limiter for the whole run, not per batch.
        let semaphore = Arc::new(Semaphore::new(params.max_concurrent.max(1)));
        let mut results = Vec::with_capacity(total_invoices);

        for (batch_index, batch) in invoices.chunks(params.batch_size.max(1)).enumerate() {
            debug!(
                batch = batch_index + 1,
                invoices = batch.len(),
                "Processing batch"
            );

            let tasks = batch
                .iter()
                .map(|invoice| self.process_invoice(invoice, Arc::clone(&semaphore)));
            let batch_results = join_all(tasks).await;

            for (invoice, result) in batch.iter().zip(batch_results) {
                match result {
                    Ok(outcome) => {
                        stats.record_outcome(&outcome);
                        results.push(outcome);
                    }
                    Err(e) => {
                        stats.record_error();
                        metrics::record_error("invoice_task");
                        error!(
                            invoice_id = %invoice.invoice_id,
                            error = %e,
                            "Invoice reconciliation failed"
                        );
                    }
                }
            }

            info!(
                batch = batch_index + 1,
                total_batches = total_batches,
                processed = stats.total_processed,
                errors = stats.errors,
                "Batch complete"
            );
        }

        info!(
            total_processed = stats.total_processed,
            perfect_matches = stats.perfect_matches,
            partial_matches = stats.partial_matches,
            llm_matches = stats.llm_matches,
            no_matches = stats.no_matches,
            errors = stats.errors,
            "Reconciliation run complete"
        );

        Ok(RunOutcome {
            total_processed: stats.total_processed,
            stats,
            results,
        })
    }

    async fn process_invoice(
        &self,
        invoice: &Invoice,
        semaphore: Arc<Semaphore>,
    ) -> Result<InvoiceOutcome, AppError> {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Semaphore closed: {}", e)))?;

        debug!(
            invoice_id = %invoice.invoice_id,
            po_number = invoice.po_number().unwrap_or(""),
            "Reconciling invoice"
        );

        let candidates = matching::find_candidates(self.store.as_ref(), invoice).await?;
        if candidates.is_empty() {
            return self.record_no_match(invoice).await;
        }

        let invoice_items = self.store.invoice_line_items(invoice.invoice_id).await?;
        let breakdown = matching::classify_variance(invoice.invoice_total_post_gst, &candidates.items);

        let analysis = match &self.analyzer {
            Some(analyzer) if candidates.items.len() <= MAX_GRN_ITEMS_FOR_ANALYSIS => Some(
                analyzer
                    .analyze(invoice, &invoice_items, &candidates.items)
                    .await,
            ),
            _ => None,
        };

        let (notes, requires_review, discrepancy_count) = match &analysis {
            Some(AnalysisOutcome::Available(result)) => {
                let summary: String = result.summary.chars().take(NOTES_SUMMARY_LIMIT).collect();
                (
                    Some(format!(
                        "LLM Analysis: {} discrepancies found. {}",
                        result.discrepancies.len(),
                        summary
                    )),
                    !result.discrepancies.is_empty(),
                    Some(result.discrepancies.len()),
                )
            }
            Some(AnalysisOutcome::Unavailable { reason }) => {
                warn!(
                    invoice_id = %invoice.invoice_id,
                    reason = %reason,
                    "Discrepancy analysis unavailable"
                );
                (None, false, None)
            }
            None => (None, false, None),
        };

        let record = self
            .store
            .insert_reconciliation(NewReconciliationRecord {
                invoice_id: invoice.invoice_id,
                po_number: invoice.po_number.clone().unwrap_or_default(),
                grn_number: invoice.grn_number.clone(),
                invoice_number: invoice.invoice_number.clone(),
                match_status: breakdown.status,
                invoice_total: Some(breakdown.invoice_total),
                grn_total: Some(breakdown.grn_total),
                total_variance_pct: Some(breakdown.variance_pct),
                total_grn_line_items: breakdown.line_count as i32,
                is_auto_matched: true,
                matching_method: candidates.tier,
                reconciliation_notes: notes,
                requires_review,
            })
            .await?;

        metrics::record_invoice_reconciled(breakdown.status.as_str());

        Ok(InvoiceOutcome {
            invoice_id: invoice.invoice_id,
            reconciliation_id: record.reconciliation_id,
            match_status: breakdown.status.as_str().to_string(),
            variance_pct: breakdown.variance_pct,
            analysis_discrepancies: discrepancy_count,
        })
    }

    async fn record_no_match(&self, invoice: &Invoice) -> Result<InvoiceOutcome, AppError> {
        debug!(invoice_id = %invoice.invoice_id, "No matching GRN records found");

        let record = self
            .store
            .insert_reconciliation(NewReconciliationRecord {
                invoice_id: invoice.invoice_id,
                po_number: invoice.po_number.clone().unwrap_or_default(),
                grn_number: None,
                invoice_number: None,
                match_status: MatchStatus::NoGrnFound,
                invoice_total: None,
                grn_total: None,
                total_variance_pct: None,
                total_grn_line_items: 0,
                is_auto_matched: true,
                matching_method: MatchTier::None,
                reconciliation_notes: Some("No matching GRN records found".to_string()),
                requires_review: false,
            })
            .await?;

        metrics::record_invoice_reconciled(MatchStatus::NoGrnFound.as_str());

        Ok(InvoiceOutcome {
            invoice_id: invoice.invoice_id,
            reconciliation_id: record.reconciliation_id,
            match_status: MatchStatus::NoGrnFound.as_str().to_string(),
            variance_pct: Decimal::ZERO,
            analysis_discrepancies: None,
        })
    }
}
