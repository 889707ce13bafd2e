// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TLSA reconciliation.
//!
//! - [`tlsa`] computes, for one hostname, which TLSA records to create and which to delete.
//!   It does no I/O.
//! - [`orchestrator`] runs a full reconciliation: it takes the in-flight guard, fetches
//!   the authoritative records, and applies each hostname's diff at the DNS provider.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tlsa_sync::config::Config;
//! use tlsa_sync::guard::MemoryGuardStore;
//! use tlsa_sync::cloudflare::CloudflareClient;
//! use tlsa_sync::stalwart::StalwartClient;
//! use tlsa_sync::reconcilers::{RunOutcome, TlsaSyncOrchestrator};
//! use tlsa_sync::upstream::build_http_client;
//!
//! # async fn example() -> Result<(), tlsa_sync::errors::SyncError> {
//! let config = Config::from_env()?;
//! let http = build_http_client(config.http_timeout)?;
//! let orchestrator = TlsaSyncOrchestrator::from_config(
//!     &config,
//!     Arc::new(StalwartClient::from_config(http.clone(), &config.stalwart)),
//!     Arc::new(CloudflareClient::from_config(http, &config.cloudflare)),
//!     Arc::new(MemoryGuardStore::new()),
//! );
//!
//! if let RunOutcome::Completed(report) = orchestrator.run().await? {
//!     println!("added {} records", report.added.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod orchestrator;
pub mod tlsa;

#[cfg(test)]
mod orchestrator_tests;

pub use orchestrator::{RunOutcome, TlsaSyncOrchestrator};
pub use tlsa::{compute_additions, compute_deletions, parse_tlsa_content, TlsaDiff};
