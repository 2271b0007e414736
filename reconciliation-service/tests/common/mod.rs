//! Common test utilities for reconciliation-service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reconciliation_service::config::{DatabaseConfig, GeminiSettings, ReconciliationConfig};
use reconciliation_service::models::{
    GrnLineItem, Invoice, InvoiceLineItem, MatchStatusCount, NewReconciliationRecord,
    ReconciliationRecord,
};
use reconciliation_service::services::RecordStore;
use rust_decimal::Decimal;
use service_core::config::Config as CommonConfig;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reconciliation_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Test configuration with no database and no inference key.
pub fn test_config() -> ReconciliationConfig {
    ReconciliationConfig {
        common: CommonConfig {
            port: 0,
            environment: "dev".to_string(),
        },
        service_name: "reconciliation-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 2,
            min_connections: 1,
        },
        gemini: GeminiSettings {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
        },
    }
}

/// In-memory record store. Runs the same engine paths as the Postgres store,
/// with hooks for failure injection and an in-flight gauge for concurrency
/// assertions.
#[derive(Default)]
pub struct MemoryStore {
    pub invoices: Vec<Invoice>,
    pub line_items: Vec<InvoiceLineItem>,
    pub grn_items: Vec<GrnLineItem>,
    pub records: Mutex<Vec<ReconciliationRecord>>,
    /// Artificial latency inside store calls, to force task overlap.
    pub latency: Duration,
    pub fail_selection: bool,
    pub fail_insert_for: Vec<Uuid>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice(mut self, invoice: Invoice) -> Self {
        self.invoices.push(invoice);
        self
    }

    pub fn with_grn_item(mut self, item: GrnLineItem) -> Self {
        self.grn_items.push(item);
        self
    }

    pub fn with_line_item(mut self, item: InvoiceLineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Highest number of store calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn stored_records(&self) -> Vec<ReconciliationRecord> {
        self.records.lock().unwrap().clone()
    }

    async fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_completed_invoices(
        &self,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Invoice>, AppError> {
        if self.fail_selection {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "selection failure injected"
            )));
        }
        Ok(self
            .invoices
            .iter()
            .filter(|i| i.processing_status == "completed")
            .filter(|i| ids.map_or(true, |ids| ids.contains(&i.invoice_id)))
            .cloned()
            .collect())
    }

    async fn invoice_line_items(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLineItem>, AppError> {
        self.enter().await;
        let mut items: Vec<InvoiceLineItem> = self
            .line_items
            .iter()
            .filter(|i| i.invoice_id == invoice_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.item_sequence);
        self.leave();
        Ok(items)
    }

    async fn find_grn_by_po_and_grn(
        &self,
        po_number: &str,
        grn_number: &str,
    ) -> Result<Vec<GrnLineItem>, AppError> {
        self.enter().await;
        let items = self
            .grn_items
            .iter()
            .filter(|i| {
                i.po_number.as_deref() == Some(po_number)
                    && i.grn_number.as_deref() == Some(grn_number)
            })
            .cloned()
            .collect();
        self.leave();
        Ok(items)
    }

    async fn find_grn_by_po(&self, po_number: &str) -> Result<Vec<GrnLineItem>, AppError> {
        self.enter().await;
        let items = self
            .grn_items
            .iter()
            .filter(|i| i.po_number.as_deref() == Some(po_number))
            .cloned()
            .collect();
        self.leave();
        Ok(items)
    }

    async fn insert_reconciliation(
        &self,
        record: NewReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError> {
        self.enter().await;
        self.leave();

        if self.fail_insert_for.contains(&record.invoice_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "insert failure injected"
            )));
        }

        let stored = ReconciliationRecord {
            reconciliation_id: Uuid::new_v4(),
            invoice_id: record.invoice_id,
            po_number: record.po_number,
            grn_number: record.grn_number,
            invoice_number: record.invoice_number,
            match_status: record.match_status.as_str().to_string(),
            invoice_total: record.invoice_total,
            grn_total: record.grn_total,
            total_variance_pct: record.total_variance_pct,
            total_grn_line_items: record.total_grn_line_items,
            is_auto_matched: record.is_auto_matched,
            matching_method: record.matching_method.as_str().to_string(),
            reconciliation_notes: record.reconciliation_notes,
            requires_review: record.requires_review,
            reconciled_utc: Utc::now(),
        };
        self.records.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn count_reconciliations(&self) -> Result<i64, AppError> {
        Ok(self.records.lock().unwrap().len() as i64)
    }

    async fn count_by_match_status(&self) -> Result<Vec<MatchStatusCount>, AppError> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records.lock().unwrap().iter() {
            *counts.entry(record.match_status.clone()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(match_status, count)| MatchStatusCount {
                match_status,
                count,
            })
            .collect())
    }

    async fn count_reconciled_since(&self, since: DateTime<Utc>) -> Result<i64, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.reconciled_utc >= since)
            .count() as i64)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

// ============================================================================
// Fixture builders
// ============================================================================

pub fn completed_invoice(
    po_number: Option<&str>,
    grn_number: Option<&str>,
    total_post_gst: i64,
) -> Invoice {
    Invoice {
        invoice_id: Uuid::new_v4(),
        po_number: po_number.map(str::to_string),
        grn_number: grn_number.map(str::to_string),
        invoice_number: Some(format!("INV-{}", Uuid::new_v4().simple())),
        invoice_date: None,
        vendor_name: Some("Acme Traders".to_string()),
        vendor_gst: Some("29ABCDE1234F1Z5".to_string()),
        vendor_pan: None,
        invoice_value_without_gst: None,
        cgst_amount: None,
        sgst_amount: None,
        igst_amount: None,
        total_gst_amount: None,
        invoice_total_post_gst: Some(Decimal::from(total_post_gst)),
        processing_status: "completed".to_string(),
        created_utc: Utc::now(),
        updated_utc: Utc::now(),
    }
}

pub fn pending_invoice(po_number: Option<&str>) -> Invoice {
    Invoice {
        processing_status: "pending".to_string(),
        ..completed_invoice(po_number, None, 100)
    }
}

pub fn grn_row(po_number: &str, grn_number: Option<&str>, total: i64) -> GrnLineItem {
    GrnLineItem {
        grn_line_item_id: Uuid::new_v4(),
        s_no: 1,
        po_number: Some(po_number.to_string()),
        grn_number: grn_number.map(str::to_string),
        sku_code: Some("SKU-1".to_string()),
        item_name: Some("Widget".to_string()),
        hsn_code: Some("8471".to_string()),
        unit: Some("piece".to_string()),
        received_qty: Some(Decimal::from(10)),
        returned_qty: None,
        unit_price: None,
        subtotal: Some(Decimal::from(total)),
        cgst_rate: None,
        cgst_amount: None,
        sgst_rate: None,
        sgst_amount: None,
        igst_rate: None,
        igst_amount: None,
        tax_amount: None,
        total: Some(Decimal::from(total)),
        supplier: Some("Acme Traders".to_string()),
        pickup_location: None,
        pickup_gstin: None,
        seller_invoice_no: None,
        supplier_invoice_date: None,
        grn_created_date: None,
        created_utc: Utc::now(),
    }
}

pub fn invoice_line(invoice_id: Uuid, item_sequence: i32, amount: i64) -> InvoiceLineItem {
    InvoiceLineItem {
        line_item_id: Uuid::new_v4(),
        invoice_id,
        item_sequence,
        item_description: "Widget".to_string(),
        hsn_code: Some("8471".to_string()),
        quantity: Some(Decimal::from(10)),
        unit_of_measurement: Some("piece".to_string()),
        unit_price: None,
        invoice_value_item_wise: Some(Decimal::from(amount)),
        cgst_rate: None,
        cgst_amount: None,
        sgst_rate: None,
        sgst_amount: None,
        igst_rate: None,
        igst_amount: None,
        total_tax_amount: None,
        item_total_amount: Some(Decimal::from(amount)),
        created_utc: Utc::now(),
    }
}

/// A model response with `rows` discrepancy rows followed by prose.
pub fn analysis_response(rows: usize) -> String {
    let mut response = String::from(
        "| Field | GRN_Value | Invoice_Value | Discrepancy_Type | Suggestion |\n\
         |-------|-----------|---------------|------------------|------------|\n",
    );
    for i in 0..rows {
        response.push_str(&format!(
            "| field_{i} | grn_{i} | inv_{i} | MISMATCH | Verify field_{i} |\n"
        ));
    }
    response.push_str("Totals disagree between the two documents.\nEscalate to procurement.\n");
    response
}
