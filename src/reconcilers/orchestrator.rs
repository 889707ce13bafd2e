// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end TLSA reconciliation run.
//!
//! One run:
//!
//! 1. Takes the in-flight guard. If another run holds it, returns
//!    [`RunOutcome::SkippedConcurrent`] without calling either upstream.
//! 2. Fetches the authoritative records from Stalwart, then resolves the Cloudflare zone.
//! 3. For each configured hostname, in order: lists the published TLSA records once,
//!    computes a [`TlsaDiff`], creates the additions, then deletes the deletions.
//! 4. Releases the guard, whatever happened in 2-3 (errors and panics included).
//!
//! While steps 2-3 are in progress the lease is renewed in the background every
//! `guard_ttl / 3`, so a slow run never outlives its lease.
//!
//! Any upstream failure aborts the run. Changes already applied stay applied.
//! [`TlsaSyncOrchestrator::run_detached`] runs on its own task, so a caller that
//! goes away (an HTTP client disconnecting) does not stop a run halfway.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cloudflare::ZoneProvider;
use crate::config::Config;
use crate::constants::{GUARD_KEY, GUARD_RENEWALS_PER_TTL};
use crate::errors::SyncError;
use crate::guard::{GuardLease, GuardStore};
use crate::metrics::{self, ACTION_ADDED, ACTION_DELETED, ACTION_SKIPPED};
use crate::records::ReconciliationReport;
use crate::reconcilers::tlsa::TlsaDiff;
use crate::stalwart::RecordSource;

/// How a triggered run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run went through; the report lists what changed.
    Completed(ReconciliationReport),
    /// Another run held the guard; nothing was touched.
    SkippedConcurrent,
}

/// Background task renewing a guard lease. Renewal stops when this is dropped.
struct LeaseRenewal(JoinHandle<()>);

impl Drop for LeaseRenewal {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives reconciliation across all configured hostnames.
pub struct TlsaSyncOrchestrator {
    source: Arc<dyn RecordSource>,
    zones: Arc<dyn ZoneProvider>,
    guard: Arc<dyn GuardStore>,
    domain: String,
    hostnames: Vec<String>,
    guard_ttl: Duration,
}

impl TlsaSyncOrchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        zones: Arc<dyn ZoneProvider>,
        guard: Arc<dyn GuardStore>,
        domain: impl Into<String>,
        hostnames: Vec<String>,
        guard_ttl: Duration,
    ) -> Self {
        Self {
            source,
            zones,
            guard,
            domain: domain.into(),
            hostnames,
            guard_ttl,
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn RecordSource>,
        zones: Arc<dyn ZoneProvider>,
        guard: Arc<dyn GuardStore>,
    ) -> Self {
        Self::new(
            source,
            zones,
            guard,
            config.stalwart.domain.clone(),
            config.stalwart.hostnames.clone(),
            config.guard_ttl,
        )
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    /// Run one guarded reconciliation.
    ///
    /// # Errors
    ///
    /// [`SyncError::Guard`] if the guard store is unreachable (nothing else is attempted),
    /// otherwise the first upstream error of the run. The guard is released in every case.
    pub async fn run(&self) -> Result<RunOutcome, SyncError> {
        let Some(lease) = self.guard.try_acquire(GUARD_KEY, self.guard_ttl).await? else {
            info!(key = GUARD_KEY, "Reconciliation already in progress, skipping");
            metrics::record_run_skipped();
            return Ok(RunOutcome::SkippedConcurrent);
        };

        let start = Instant::now();
        let renewal = self.spawn_renewal(&lease);
        let result = AssertUnwindSafe(self.reconcile()).catch_unwind().await;
        drop(renewal);
        self.release(&lease).await;

        match result {
            Ok(Ok(report)) => {
                metrics::record_run_completed(start.elapsed());
                if report.is_noop() {
                    info!(
                        skipped = report.skipped.len(),
                        elapsed = ?start.elapsed(),
                        "Reconciliation completed, TLSA records already in sync"
                    );
                } else {
                    info!(
                        added = report.added.len(),
                        deleted = report.deleted.len(),
                        skipped = report.skipped.len(),
                        elapsed = ?start.elapsed(),
                        "Reconciliation completed"
                    );
                }
                Ok(RunOutcome::Completed(report))
            }
            Ok(Err(e)) => {
                metrics::record_run_failed(start.elapsed());
                error!(
                    error = %e,
                    reason = e.reason(),
                    upstream = e.is_upstream(),
                    elapsed = ?start.elapsed(),
                    "Reconciliation failed"
                );
                Err(e)
            }
            Err(panic) => {
                metrics::record_run_failed(start.elapsed());
                error!("Reconciliation panicked");
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Run one guarded reconciliation on its own task and wait for it.
    ///
    /// Dropping the returned future does not cancel the run: it carries on to
    /// completion and releases the guard.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`], plus [`SyncError::Aborted`] when the task panicked.
    pub async fn run_detached(self: Arc<Self>) -> Result<RunOutcome, SyncError> {
        match tokio::spawn(async move { self.run().await }).await {
            Ok(result) => result,
            Err(e) => {
                let reason = if e.is_panic() {
                    "reconciliation task panicked"
                } else {
                    "reconciliation task was cancelled"
                };
                error!(reason, "Reconciliation task ended without a result");
                Err(SyncError::Aborted {
                    reason: reason.to_string(),
                })
            }
        }
    }

    fn spawn_renewal(&self, lease: &GuardLease) -> LeaseRenewal {
        let guard = Arc::clone(&self.guard);
        let lease = lease.clone();
        let ttl = self.guard_ttl;
        let period = (ttl / GUARD_RENEWALS_PER_TTL).max(Duration::from_millis(1));

        LeaseRenewal(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match guard.renew(&lease, ttl).await {
                    Ok(true) => debug!(key = lease.key(), "Guard lease renewed"),
                    Ok(false) => {
                        warn!(key = lease.key(), "Guard lease lost before the run finished");
                        return;
                    }
                    Err(e) => warn!(key = lease.key(), error = %e, "Failed to renew guard lease"),
                }
            }
        }))
    }

    async fn release(&self, lease: &GuardLease) {
        match self.guard.release(lease).await {
            Ok(true) => debug!(key = lease.key(), "Guard released"),
            Ok(false) => warn!(
                key = lease.key(),
                "Guard lease had already expired when the run finished"
            ),
            Err(e) => error!(key = lease.key(), error = %e, "Failed to release guard"),
        }
    }

    /// The unguarded body of a run.
    async fn reconcile(&self) -> Result<ReconciliationReport, SyncError> {
        let records = self.source.fetch().await?;
        let zone = self.zones.resolve_zone(&self.domain).await?;
        debug!(domain = %self.domain, zone_id = %zone.id, records = records.len(), "Starting TLSA reconciliation");

        let mut report = ReconciliationReport {
            dns_records: records,
            ..ReconciliationReport::default()
        };

        for hostname in &self.hostnames {
            let existing = self.zones.list_tlsa_records(&zone.id, hostname).await?;
            let diff = TlsaDiff::compute(&report.dns_records, &existing, hostname);

            if diff.is_empty() {
                debug!(hostname = %hostname, published = existing.len(), "TLSA records already in sync");
            }
            self.apply(&zone.id, diff, &mut report).await?;
        }

        Ok(report)
    }

    async fn apply(
        &self,
        zone_id: &str,
        diff: TlsaDiff,
        report: &mut ReconciliationReport,
    ) -> Result<(), SyncError> {
        for candidate in diff.additions {
            self.zones
                .create_tlsa_record(zone_id, &diff.hostname, &candidate.data)
                .await?;
            metrics::record_records(ACTION_ADDED, 1);
            report.added.push(candidate.record);
        }

        for record in diff.deletions {
            self.zones.delete_record(zone_id, &record.id).await?;
            metrics::record_records(ACTION_DELETED, 1);
            report.deleted.push(record.to_dns_record());
        }

        for skipped in diff.skipped {
            if !report.skipped.contains(&skipped) {
                metrics::record_records(ACTION_SKIPPED, 1);
                report.skipped.push(skipped);
            }
        }

        Ok(())
    }
}
