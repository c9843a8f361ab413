//! Stock reconciliation ledger
//!
//! Append-only stock movement ledger with expected-vs-actual summaries,
//! manual reconciliation and order ingestion from a storefront.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod task_runner;
