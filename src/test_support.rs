// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory stand-ins for the upstream services, shared by unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cloudflare::ZoneProvider;
use crate::errors::SyncError;
use crate::guard::{GuardStore, MemoryGuardStore};
use crate::records::{canonical_name, DnsRecord, ExternalTlsaRecord, TlsaData, Zone};
use crate::reconcilers::orchestrator::TlsaSyncOrchestrator;
use crate::stalwart::RecordSource;

pub const DOMAIN: &str = "example.com";
pub const ZONE_ID: &str = "zone-1";

/// Record source returning a fixed, replaceable record set.
#[derive(Default)]
pub struct FakeRecordSource {
    pub records: Mutex<Vec<DnsRecord>>,
    pub fail: Mutex<bool>,
    pub panic: Mutex<bool>,
    /// Simulated latency of each fetch
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
}

impl FakeRecordSource {
    pub fn with_records(records: Vec<DnsRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<DnsRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for FakeRecordSource {
    async fn fetch(&self) -> Result<Vec<DnsRecord>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.panic.lock().unwrap() {
            panic!("record source exploded");
        }
        if *self.fail.lock().unwrap() {
            return Err(SyncError::Upstream {
                service: "stalwart",
                operation: "fetch_records",
                status: Some(500),
                reason: "boom".to_string(),
            });
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Zone provider keeping published records in memory, with per-operation failure switches.
#[derive(Default)]
pub struct FakeZoneProvider {
    pub records: Mutex<Vec<ExternalTlsaRecord>>,
    pub zone_missing: Mutex<bool>,
    pub fail_create: Mutex<bool>,
    pub fail_delete: Mutex<bool>,
    pub calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeZoneProvider {
    pub fn with_records(records: Vec<ExternalTlsaRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            next_id: AtomicUsize::new(1000),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<ExternalTlsaRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn upstream_error(operation: &'static str) -> SyncError {
        SyncError::Upstream {
            service: "cloudflare",
            operation,
            status: Some(400),
            reason: "rejected".to_string(),
        }
    }
}

#[async_trait]
impl ZoneProvider for FakeZoneProvider {
    async fn resolve_zone(&self, domain: &str) -> Result<Zone, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.zone_missing.lock().unwrap() {
            return Err(SyncError::ZoneNotFound {
                domain: domain.to_string(),
            });
        }
        Ok(Zone {
            id: ZONE_ID.to_string(),
            name: domain.to_string(),
            status: Some("active".to_string()),
        })
    }

    async fn list_tlsa_records(
        &self,
        _zone_id: &str,
        hostname: &str,
    ) -> Result<Vec<ExternalTlsaRecord>, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = canonical_name(hostname);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect())
    }

    async fn create_tlsa_record(
        &self,
        _zone_id: &str,
        hostname: &str,
        data: &TlsaData,
    ) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_create.lock().unwrap() {
            return Err(Self::upstream_error("create_tlsa_record"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.records.lock().unwrap().push(ExternalTlsaRecord::new(
            id,
            canonical_name(hostname),
            data.to_string(),
        ));
        Ok(())
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_delete.lock().unwrap() {
            return Err(Self::upstream_error("delete_record"));
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != record_id);
        if records.len() == before {
            return Err(SyncError::Upstream {
                service: "cloudflare",
                operation: "delete_record",
                status: Some(404),
                reason: "record not found".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything a test needs to drive an orchestrator and inspect the fakes afterwards.
pub struct Harness {
    pub source: Arc<FakeRecordSource>,
    pub zones: Arc<FakeZoneProvider>,
    pub guard: Arc<MemoryGuardStore>,
    pub orchestrator: Arc<TlsaSyncOrchestrator>,
}

impl Harness {
    pub fn new(
        records: Vec<DnsRecord>,
        published: Vec<ExternalTlsaRecord>,
        hostnames: &[&str],
    ) -> Self {
        Self::with_guard_ttl(records, published, hostnames, Duration::from_secs(60))
    }

    pub fn with_guard_ttl(
        records: Vec<DnsRecord>,
        published: Vec<ExternalTlsaRecord>,
        hostnames: &[&str],
        guard_ttl: Duration,
    ) -> Self {
        let source = Arc::new(FakeRecordSource::with_records(records));
        let zones = Arc::new(FakeZoneProvider::with_records(published));
        let guard = Arc::new(MemoryGuardStore::new());
        let orchestrator = Arc::new(TlsaSyncOrchestrator::new(
            source.clone(),
            zones.clone(),
            guard.clone() as Arc<dyn GuardStore>,
            DOMAIN,
            hostnames.iter().map(|h| (*h).to_string()).collect(),
            guard_ttl,
        ));
        Self {
            source,
            zones,
            guard,
            orchestrator,
        }
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.source.delay.lock().unwrap() = Some(delay);
    }

    pub fn upstream_calls(&self) -> usize {
        self.source.calls() + self.zones.calls()
    }
}
