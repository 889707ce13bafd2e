// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Record types shared by the upstream clients and the reconciler.
//!
//! - [`DnsRecord`] is what the Stalwart record source publishes (and what a run reports back).
//! - [`ExternalTlsaRecord`] is a TLSA record as Cloudflare stores it; its identity is `id`.
//! - [`Zone`] is the Cloudflare zone the records live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{TLSA_NAME_PREFIX, TLSA_RECORD_TYPE};

/// Record types the Stalwart DNS API reports.
///
/// Anything else deserializes as [`DnsRecordType::Other`] so a new record kind on the
/// mail server does not break the whole fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    Mx,
    Txt,
    Srv,
    Cname,
    Tlsa,
    #[serde(other)]
    Other,
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Srv => "SRV",
            Self::Cname => "CNAME",
            Self::Tlsa => "TLSA",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// A record from the authoritative (mail server) record set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
}

impl DnsRecord {
    /// Build a TLSA record with the given owner name and raw content.
    pub fn tlsa(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            record_type: DnsRecordType::Tlsa,
            name: name.into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn is_tlsa(&self) -> bool {
        self.record_type == DnsRecordType::Tlsa
    }
}

/// Parsed TLSA rdata, in the shape Cloudflare expects under `data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TlsaData {
    pub usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    pub certificate: String,
}

impl fmt::Display for TlsaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.usage, self.selector, self.matching_type, self.certificate
        )
    }
}

fn default_tlsa_type() -> String {
    TLSA_RECORD_TYPE.to_string()
}

/// A TLSA record as stored at the DNS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTlsaRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default = "default_tlsa_type")]
    pub record_type: String,
    pub content: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub data: Option<TlsaData>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,
}

impl ExternalTlsaRecord {
    /// Minimal record, mostly useful for fakes and tests.
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            record_type: default_tlsa_type(),
            content: content.into(),
            proxied: false,
            ttl: None,
            data: None,
            comment: None,
            created_on: None,
            modified_on: None,
        }
    }

    /// The `(type, name, content)` view used when reporting a deletion.
    #[must_use]
    pub fn to_dns_record(&self) -> DnsRecord {
        DnsRecord::tlsa(self.name.clone(), self.content.clone())
    }
}

/// A Cloudflare zone. Only `id` drives reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// An authoritative TLSA record that was not reconciled because its content is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub name: String,
    pub content: String,
    pub reason: String,
}

/// Everything one completed run did, in hostname configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// The authoritative record set the run worked from
    pub dns_records: Vec<DnsRecord>,
    pub added: Vec<DnsRecord>,
    pub deleted: Vec<DnsRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl ReconciliationReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }
}

/// Owner name TLSA records for `hostname` must be published under (`_25._tcp.<hostname>`).
#[must_use]
pub fn canonical_name(hostname: &str) -> String {
    format!("{TLSA_NAME_PREFIX}{hostname}")
}

/// Record content with runs of whitespace collapsed to one space and the ends trimmed.
#[must_use]
pub fn canonical_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
