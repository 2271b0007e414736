//! HTTP handlers for the reconciliation API.

use crate::services::analyzer::DiscrepancyAnalyzer;
use crate::services::inference::InferenceClient;
use crate::services::metrics;
use crate::services::recon::{ReconciliationRunner, RunParams};
use crate::startup::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

fn default_delay_seconds() -> f64 {
    1.0
}

fn default_max_concurrent() -> u64 {
    10
}

fn default_batch_size() -> u64 {
    100
}

/// Request body for starting a reconciliation run. Out-of-range values are
/// rejected before any work starts.
#[derive(Debug, Deserialize, Validate)]
pub struct RunReconciliationRequest {
    pub invoice_ids: Option<Vec<Uuid>>,

    /// Pacing delay applied before every inference call.
    #[serde(default = "default_delay_seconds")]
    #[validate(range(min = 0.0, max = 10.0, message = "delay_seconds must be between 0 and 10"))]
    pub delay_seconds: f64,

    /// Ceiling on concurrently processed invoices for the whole run.
    #[serde(default = "default_max_concurrent")]
    #[validate(range(min = 1, max = 50, message = "max_concurrent must be between 1 and 50"))]
    pub max_concurrent: u64,

    /// Invoices per batch; batches run sequentially.
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 10, max = 1000, message = "batch_size must be between 10 and 1000"))]
    pub batch_size: u64,
}

impl RunReconciliationRequest {
    fn into_params(self) -> RunParams {
        RunParams {
            invoice_ids: self.invoice_ids,
            delay_seconds: self.delay_seconds,
            max_concurrent: self.max_concurrent as usize,
            batch_size: self.batch_size as usize,
        }
    }
}

/// `POST /api/reconciliation/run`
///
/// Runs a full reconciliation batch and replies with aggregate stats plus
/// per-invoice outcomes. A run-level failure still carries the stats
/// accumulated before the failure.
pub async fn run_reconciliation(
    State(state): State<AppState>,
    Json(request): Json<RunReconciliationRequest>,
) -> Result<Response, AppError> {
    request.validate()?;

    info!(
        delay_seconds = request.delay_seconds,
        max_concurrent = request.max_concurrent,
        batch_size = request.batch_size,
        "Reconciliation run requested"
    );

    let analyzer = state.completion.as_ref().map(|provider| {
        let client = InferenceClient::new(
            Arc::clone(provider),
            Duration::from_secs_f64(request.delay_seconds),
        );
        DiscrepancyAnalyzer::new(Arc::new(client))
    });

    let processing_params = json!({
        "delay_seconds": request.delay_seconds,
        "max_concurrent": request.max_concurrent,
        "batch_size": request.batch_size,
    });

    let runner = ReconciliationRunner::new(Arc::clone(&state.store), analyzer);
    let params = request.into_params();

    match runner.run(&params).await {
        Ok(outcome) => {
            metrics::record_run("completed");
            Ok((
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Reconciliation completed successfully",
                    "data": {
                        "total_processed": outcome.total_processed,
                        "stats": outcome.stats,
                        "results": outcome.results,
                        "processing_params": processing_params,
                    }
                })),
            )
                .into_response())
        }
        Err(run_error) => {
            metrics::record_run("failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": run_error.source.to_string(),
                    "stats": run_error.stats,
                })),
            )
                .into_response())
        }
    }
}

/// `GET /api/reconciliation/status`
///
/// Aggregate reconciliation-record counts: overall, by match status, and
/// created in the last 24 hours.
pub async fn reconciliation_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let total = state.store.count_reconciliations().await?;
    let breakdown = state.store.count_by_match_status().await?;
    let recent_cutoff = Utc::now() - ChronoDuration::hours(24);
    let recent = state.store.count_reconciled_since(recent_cutoff).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "total_reconciliations": total,
            "recent_24h": recent,
            "status_breakdown": breakdown,
            "last_updated": Utc::now().to_rfc3339(),
        }
    })))
}
