//! Database service for reconciliation-service.

use crate::models::{
    GrnLineItem, Invoice, InvoiceLineItem, MatchStatusCount, NewReconciliationRecord,
    ProcessingStatus, ReconciliationRecord,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Record-store operations the reconciliation engine depends on. The sqlx
/// `Database` is the production implementation; tests run the same engine
/// against an in-memory store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Invoices eligible for reconciliation (`completed`), optionally
    /// restricted to an id set.
    async fn list_completed_invoices(&self, ids: Option<&[Uuid]>)
        -> Result<Vec<Invoice>, AppError>;

    /// Line items of one invoice, ordered by sequence.
    async fn invoice_line_items(&self, invoice_id: Uuid)
        -> Result<Vec<InvoiceLineItem>, AppError>;

    /// GRN rows matching both PO and GRN number (exact tier).
    async fn find_grn_by_po_and_grn(
        &self,
        po_number: &str,
        grn_number: &str,
    ) -> Result<Vec<GrnLineItem>, AppError>;

    /// GRN rows matching the PO number alone.
    async fn find_grn_by_po(&self, po_number: &str) -> Result<Vec<GrnLineItem>, AppError>;

    /// Persist one reconciliation record, returning the stored row.
    async fn insert_reconciliation(
        &self,
        record: NewReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError>;

    async fn count_reconciliations(&self) -> Result<i64, AppError>;

    async fn count_by_match_status(&self) -> Result<Vec<MatchStatusCount>, AppError>;

    async fn count_reconciled_since(&self, since: DateTime<Utc>) -> Result<i64, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "reconciliation-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

const INVOICE_COLUMNS: &str = "invoice_id, po_number, grn_number, invoice_number, invoice_date, \
     vendor_name, vendor_gst, vendor_pan, invoice_value_without_gst, cgst_amount, sgst_amount, \
     igst_amount, total_gst_amount, invoice_total_post_gst, processing_status, created_utc, \
     updated_utc";

const GRN_COLUMNS: &str = "grn_line_item_id, s_no, po_number, grn_number, sku_code, item_name, \
     hsn_code, unit, received_qty, returned_qty, unit_price, subtotal, cgst_rate, cgst_amount, \
     sgst_rate, sgst_amount, igst_rate, igst_amount, tax_amount, total, supplier, \
     pickup_location, pickup_gstin, seller_invoice_no, supplier_invoice_date, grn_created_date, \
     created_utc";

#[async_trait]
impl RecordStore for Database {
    #[instrument(skip(self, ids))]
    async fn list_completed_invoices(
        &self,
        ids: Option<&[Uuid]>,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_completed_invoices"])
            .start_timer();

        let invoices = if let Some(ids) = ids {
            sqlx::query_as::<_, Invoice>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices \
                 WHERE processing_status = $1 AND invoice_id = ANY($2) \
                 ORDER BY created_utc"
            ))
            .bind(ProcessingStatus::Completed.as_str())
            .bind(ids)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Invoice>(&format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices \
                 WHERE processing_status = $1 \
                 ORDER BY created_utc"
            ))
            .bind(ProcessingStatus::Completed.as_str())
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn invoice_line_items(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            SELECT line_item_id, invoice_id, item_sequence, item_description, hsn_code, quantity,
                   unit_of_measurement, unit_price, invoice_value_item_wise, cgst_rate,
                   cgst_amount, sgst_rate, sgst_amount, igst_rate, igst_amount, total_tax_amount,
                   item_total_amount, created_utc
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY item_sequence
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice items: {}", e))
        })?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn find_grn_by_po_and_grn(
        &self,
        po_number: &str,
        grn_number: &str,
    ) -> Result<Vec<GrnLineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_grn_by_po_and_grn"])
            .start_timer();

        let items = sqlx::query_as::<_, GrnLineItem>(&format!(
            "SELECT {GRN_COLUMNS} FROM grn_line_items \
             WHERE po_number = $1 AND grn_number = $2 \
             ORDER BY s_no"
        ))
        .bind(po_number)
        .bind(grn_number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to query GRN rows: {}", e)))?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn find_grn_by_po(&self, po_number: &str) -> Result<Vec<GrnLineItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_grn_by_po"])
            .start_timer();

        let items = sqlx::query_as::<_, GrnLineItem>(&format!(
            "SELECT {GRN_COLUMNS} FROM grn_line_items \
             WHERE po_number = $1 \
             ORDER BY s_no"
        ))
        .bind(po_number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to query GRN rows: {}", e)))?;

        timer.observe_duration();
        Ok(items)
    }

    #[instrument(skip(self, record), fields(invoice_id = %record.invoice_id))]
    async fn insert_reconciliation(
        &self,
        record: NewReconciliationRecord,
    ) -> Result<ReconciliationRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_reconciliation"])
            .start_timer();

        let stored = sqlx::query_as::<_, ReconciliationRecord>(
            r#"
            INSERT INTO reconciliation_records
                (invoice_id, po_number, grn_number, invoice_number, match_status, invoice_total,
                 grn_total, total_variance_pct, total_grn_line_items, is_auto_matched,
                 matching_method, reconciliation_notes, requires_review)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING reconciliation_id, invoice_id, po_number, grn_number, invoice_number,
                      match_status, invoice_total, grn_total, total_variance_pct,
                      total_grn_line_items, is_auto_matched, matching_method,
                      reconciliation_notes, requires_review, reconciled_utc
            "#,
        )
        .bind(record.invoice_id)
        .bind(&record.po_number)
        .bind(&record.grn_number)
        .bind(&record.invoice_number)
        .bind(record.match_status.as_str())
        .bind(record.invoice_total)
        .bind(record.grn_total)
        .bind(record.total_variance_pct)
        .bind(record.total_grn_line_items)
        .bind(record.is_auto_matched)
        .bind(record.matching_method.as_str())
        .bind(&record.reconciliation_notes)
        .bind(record.requires_review)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to insert reconciliation record: {}",
                e
            ))
        })?;

        timer.observe_duration();
        info!(
            reconciliation_id = %stored.reconciliation_id,
            match_status = %stored.match_status,
            "Reconciliation record created"
        );

        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn count_reconciliations(&self) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_reconciliations"])
            .start_timer();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reconciliation_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to count records: {}", e))
            })?;

        timer.observe_duration();
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn count_by_match_status(&self) -> Result<Vec<MatchStatusCount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_by_match_status"])
            .start_timer();

        let rows = sqlx::query_as::<_, MatchStatusCount>(
            r#"
            SELECT match_status, COUNT(*) AS count
            FROM reconciliation_records
            GROUP BY match_status
            ORDER BY match_status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count by status: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn count_reconciled_since(&self, since: DateTime<Utc>) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_reconciled_since"])
            .start_timer();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM reconciliation_records WHERE reconciled_utc >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count recent records: {}", e))
        })?;

        timer.observe_duration();
        Ok(count)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }
}
