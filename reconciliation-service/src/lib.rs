//! Reconciliation Service - Invoice to GRN reconciliation with AI-powered
//! discrepancy analysis.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
