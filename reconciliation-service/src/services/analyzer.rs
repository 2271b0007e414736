//! LLM-backed field-by-field discrepancy analysis.
//!
//! Builds an invoice-side and a GRN-side summary document, asks the
//! inference client for a field-by-field comparison, and parses the
//! pipe-table in the response into discrete discrepancy entries. The
//! analysis is strictly additive: when it cannot run or fails, the invoice
//! still reconciles on the deterministic path.

use crate::models::{GrnLineItem, Invoice, InvoiceLineItem};
use crate::services::inference::InferenceClient;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Candidate-set cap above which the analysis is skipped; bounds token cost
/// and latency per invoice.
pub const MAX_GRN_ITEMS_FOR_ANALYSIS: usize = 20;

/// Line items included per side of the comparison payload.
const MAX_LINE_ITEMS_IN_PAYLOAD: usize = 10;

/// One row of the comparison table returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub field: String,
    pub grn_value: String,
    pub invoice_value: String,
    pub discrepancy_type: String,
    pub suggestion: String,
}

/// Parsed analysis: table rows plus the prose that followed the table.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub discrepancies: Vec<Discrepancy>,
    pub summary: String,
    pub raw_response: String,
}

/// Outcome of an analysis attempt. `Unavailable` is an expected state, not
/// an error; callers branch on the variant.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Available(Analysis),
    Unavailable { reason: String },
}

pub struct DiscrepancyAnalyzer {
    client: Arc<InferenceClient>,
}

impl DiscrepancyAnalyzer {
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }

    pub async fn analyze(
        &self,
        invoice: &Invoice,
        invoice_items: &[InvoiceLineItem],
        grn_items: &[GrnLineItem],
    ) -> AnalysisOutcome {
        let prompt = build_comparison_prompt(invoice, invoice_items, grn_items);

        debug!(
            invoice_id = %invoice.invoice_id,
            prompt_len = prompt.len(),
            grn_items = grn_items.len(),
            "Requesting field-by-field comparison"
        );

        match self.client.invoke(&prompt).await {
            Ok(response) => AnalysisOutcome::Available(parse_analysis_response(&response)),
            Err(e) => AnalysisOutcome::Unavailable {
                reason: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Comparison Payload
// ============================================================================

fn money(value: &Option<Decimal>) -> String {
    value.unwrap_or_default().to_string()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn date(value: &Option<chrono::NaiveDate>) -> String {
    value.map(|d| d.to_string()).unwrap_or_default()
}

#[derive(Serialize)]
struct InvoiceDocument {
    header_info: InvoiceHeader,
    financial_totals: InvoiceTotals,
    line_items: Vec<InvoiceLine>,
}

#[derive(Serialize)]
struct InvoiceHeader {
    po_number: String,
    grn_number: String,
    invoice_number: String,
    invoice_date: String,
    vendor_name: String,
    vendor_gst: String,
    vendor_pan: String,
}

#[derive(Serialize)]
struct InvoiceTotals {
    invoice_value_without_gst: String,
    cgst_amount: String,
    sgst_amount: String,
    igst_amount: String,
    total_gst_amount: String,
    invoice_total_post_gst: String,
}

#[derive(Serialize)]
struct InvoiceLine {
    item_sequence: i32,
    item_description: String,
    hsn_code: String,
    quantity: String,
    unit_of_measurement: String,
    unit_price: String,
    invoice_value_item_wise: String,
    cgst_rate: String,
    cgst_amount: String,
    sgst_rate: String,
    sgst_amount: String,
    igst_rate: String,
    igst_amount: String,
    item_total_amount: String,
}

#[derive(Serialize)]
struct GrnDocument {
    header_info: GrnHeader,
    financial_totals: GrnTotals,
    line_items: Vec<GrnLine>,
}

#[derive(Serialize, Default)]
struct GrnHeader {
    po_number: String,
    grn_number: String,
    invoice_number: String,
    invoice_date: String,
    vendor_name: String,
    vendor_gst: String,
    grn_created_date: String,
}

#[derive(Serialize, Default)]
struct GrnTotals {
    total_subtotal: String,
    total_cgst_amount: String,
    total_sgst_amount: String,
    total_igst_amount: String,
    total_tax_amount: String,
    grand_total: String,
}

#[derive(Serialize)]
struct GrnLine {
    s_no: i32,
    item_name: String,
    sku_code: String,
    hsn_code: String,
    quantity: String,
    unit: String,
    price: String,
    subtotal: String,
    cgst_rate: String,
    cgst_amount: String,
    sgst_rate: String,
    sgst_amount: String,
    igst_rate: String,
    igst_amount: String,
    tax_amount: String,
    total: String,
}

fn build_invoice_document(invoice: &Invoice, items: &[InvoiceLineItem]) -> InvoiceDocument {
    InvoiceDocument {
        header_info: InvoiceHeader {
            po_number: text(&invoice.po_number),
            grn_number: text(&invoice.grn_number),
            invoice_number: text(&invoice.invoice_number),
            invoice_date: date(&invoice.invoice_date),
            vendor_name: text(&invoice.vendor_name),
            vendor_gst: text(&invoice.vendor_gst),
            vendor_pan: text(&invoice.vendor_pan),
        },
        financial_totals: InvoiceTotals {
            invoice_value_without_gst: money(&invoice.invoice_value_without_gst),
            cgst_amount: money(&invoice.cgst_amount),
            sgst_amount: money(&invoice.sgst_amount),
            igst_amount: money(&invoice.igst_amount),
            total_gst_amount: money(&invoice.total_gst_amount),
            invoice_total_post_gst: money(&invoice.invoice_total_post_gst),
        },
        line_items: items
            .iter()
            .take(MAX_LINE_ITEMS_IN_PAYLOAD)
            .map(|item| InvoiceLine {
                item_sequence: item.item_sequence,
                item_description: item.item_description.clone(),
                hsn_code: text(&item.hsn_code),
                quantity: money(&item.quantity),
                unit_of_measurement: text(&item.unit_of_measurement),
                unit_price: money(&item.unit_price),
                invoice_value_item_wise: money(&item.invoice_value_item_wise),
                cgst_rate: money(&item.cgst_rate),
                cgst_amount: money(&item.cgst_amount),
                sgst_rate: money(&item.sgst_rate),
                sgst_amount: money(&item.sgst_amount),
                igst_rate: money(&item.igst_rate),
                igst_amount: money(&item.igst_amount),
                item_total_amount: money(&item.item_total_amount),
            })
            .collect(),
    }
}

fn build_grn_document(grn_items: &[GrnLineItem]) -> GrnDocument {
    let Some(first) = grn_items.first() else {
        return GrnDocument {
            header_info: GrnHeader::default(),
            financial_totals: GrnTotals::default(),
            line_items: Vec::new(),
        };
    };

    let sum = |field: fn(&GrnLineItem) -> Option<Decimal>| -> Decimal {
        grn_items.iter().map(|i| field(i).unwrap_or_default()).sum()
    };

    GrnDocument {
        // Header fields come from the first row; the warehouse export repeats
        // them across a GRN's rows.
        header_info: GrnHeader {
            po_number: text(&first.po_number),
            grn_number: text(&first.grn_number),
            invoice_number: text(&first.seller_invoice_no),
            invoice_date: date(&first.supplier_invoice_date),
            vendor_name: first
                .pickup_location
                .clone()
                .filter(|s| !s.is_empty())
                .or_else(|| first.supplier.clone())
                .unwrap_or_default(),
            vendor_gst: text(&first.pickup_gstin),
            grn_created_date: date(&first.grn_created_date),
        },
        financial_totals: GrnTotals {
            total_subtotal: sum(|i| i.subtotal).to_string(),
            total_cgst_amount: sum(|i| i.cgst_amount).to_string(),
            total_sgst_amount: sum(|i| i.sgst_amount).to_string(),
            total_igst_amount: sum(|i| i.igst_amount).to_string(),
            total_tax_amount: sum(|i| i.tax_amount).to_string(),
            grand_total: sum(|i| i.total).to_string(),
        },
        line_items: grn_items
            .iter()
            .take(MAX_LINE_ITEMS_IN_PAYLOAD)
            .map(|item| GrnLine {
                s_no: item.s_no,
                item_name: text(&item.item_name),
                sku_code: text(&item.sku_code),
                hsn_code: text(&item.hsn_code),
                quantity: money(&item.received_qty),
                unit: text(&item.unit),
                price: money(&item.unit_price),
                subtotal: money(&item.subtotal),
                cgst_rate: money(&item.cgst_rate),
                cgst_amount: money(&item.cgst_amount),
                sgst_rate: money(&item.sgst_rate),
                sgst_amount: money(&item.sgst_amount),
                igst_rate: money(&item.igst_rate),
                igst_amount: money(&item.igst_amount),
                tax_amount: money(&item.tax_amount),
                total: money(&item.total),
            })
            .collect(),
    }
}

pub(crate) fn build_comparison_prompt(
    invoice: &Invoice,
    invoice_items: &[InvoiceLineItem],
    grn_items: &[GrnLineItem],
) -> String {
    let invoice_json = serde_json::to_string_pretty(&build_invoice_document(invoice, invoice_items))
        .unwrap_or_default();
    let grn_json =
        serde_json::to_string_pretty(&build_grn_document(grn_items)).unwrap_or_default();

    format!(
        r#"
You are a supply-chain data auditor specializing in invoice-GRN reconciliation. Below are two JSON documents:

1. `GRN JSON`: trusted record of what was received from the supplier
2. `INVOICE JSON`: extracted data from supplier invoice

Please do the following:
- Compare both JSONs **field by field** across all sections (header_info, financial_totals, line_items)
- Identify **any missing fields, mismatched values, or extra entries**
- For numerical values, consider small rounding differences (<0.01) as acceptable
- For text fields, consider case-insensitive matching and common abbreviations
- Output a **CSV-style markdown table** with the following columns:
  Field, GRN_Value, Invoice_Value, Discrepancy_Type, Suggestion
- Then write a brief **natural language summary** explaining the main issues and suggested actions

**COMPARISON RULES:**
1. Header Info: Match PO numbers, GRN numbers, vendor details, dates
2. Financial Totals: Compare aggregated amounts with tolerance for rounding
3. Line Items: Match quantities, rates, descriptions, tax amounts
4. Discrepancy Types: MISSING, MISMATCH, EXTRA, AMOUNT_VARIANCE, DATE_ISSUE, VENDOR_ISSUE

--- GRN JSON ---
{grn_json}

--- INVOICE JSON ---
{invoice_json}

Please provide the analysis in the format specified above.
"#
    )
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Split the model's response into table rows and trailing prose.
///
/// Any pipe-containing line that is not purely separator characters counts as
/// a table row. The table region ends at the first pipe-free non-blank line
/// after at least one row was seen; everything from there on is prose. The
/// first captured row is the column header and is discarded; rows that do not
/// yield at least 5 non-empty cells are dropped rather than rejected.
pub(crate) fn parse_analysis_response(response: &str) -> Analysis {
    let mut table_rows: Vec<&str> = Vec::new();
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut in_table = false;
    let mut table_ended = false;

    for line in response.trim().lines() {
        if line.contains('|') && !table_ended {
            let is_separator = line.trim().chars().all(|c| matches!(c, '|' | '-' | ' '));
            if !is_separator {
                table_rows.push(line);
                in_table = true;
            }
        } else if in_table && !line.contains('|') && !line.trim().is_empty() {
            table_ended = true;
            summary_lines.push(line);
        } else if table_ended {
            summary_lines.push(line);
        }
    }

    let discrepancies = table_rows
        .iter()
        .skip(1)
        .filter_map(|line| {
            let cells: Vec<&str> = line
                .split('|')
                .map(str::trim)
                .filter(|cell| !cell.is_empty())
                .collect();
            if cells.len() >= 5 {
                Some(Discrepancy {
                    field: cells[0].to_string(),
                    grn_value: cells[1].to_string(),
                    invoice_value: cells[2].to_string(),
                    discrepancy_type: cells[3].to_string(),
                    suggestion: cells[4].to_string(),
                })
            } else {
                None
            }
        })
        .collect();

    Analysis {
        discrepancies,
        summary: summary_lines.join("\n").trim().to_string(),
        raw_response: response.to_string(),
    }
}
