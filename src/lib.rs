// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # tlsa-sync - DANE TLSA reconciliation for Stalwart and Cloudflare
//!
//! A Stalwart mail server knows which TLSA records its current certificates need.
//! This crate copies those records into the Cloudflare zone for the mail domain, and
//! removes the stale ones, whenever it is triggered over HTTP.
//!
//! ## Overview
//!
//! One reconciliation run:
//!
//! - takes a cluster-wide in-flight guard (Redis, or in-process for single replicas)
//! - fetches the authoritative record set from Stalwart
//! - resolves the Cloudflare zone for the configured domain
//! - for every configured mail hostname, publishes missing TLSA records under
//!   `_25._tcp.<hostname>` and deletes the ones that are no longer authoritative
//! - releases the guard
//!
//! ## Modules
//!
//! - [`config`] - Environment configuration, read once at startup
//! - [`stalwart`] - Authoritative record source client
//! - [`cloudflare`] - DNS provider client
//! - [`guard`] - In-flight guard stores
//! - [`reconcilers`] - TLSA diff and the run orchestrator
//! - [`server`] - HTTP trigger, health and metrics endpoints
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust
//! use tlsa_sync::records::DnsRecord;
//! use tlsa_sync::reconcilers::TlsaDiff;
//!
//! let authoritative = vec![DnsRecord::tlsa("_25._tcp.mail.example.com.", "3 1 1 abcd")];
//! let diff = TlsaDiff::compute(&authoritative, &[], "mail.example.com");
//!
//! assert_eq!(diff.additions.len(), 1);
//! assert_eq!(diff.additions[0].record.name, "_25._tcp.mail.example.com");
//! assert!(diff.deletions.is_empty());
//! ```

pub mod cloudflare;
pub mod config;
pub mod constants;
pub mod errors;
pub mod guard;
pub mod http_errors;
pub mod metrics;
pub mod reconcilers;
pub mod records;
pub mod server;
pub mod stalwart;
pub mod upstream;

#[cfg(test)]
mod test_support;
