// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TLSA diff computation.
//!
//! Pure functions, no I/O. Given the authoritative record set from the mail server and
//! the TLSA records the DNS provider currently holds for one hostname, decide what has
//! to be created and what has to go.
//!
//! # Rules
//!
//! For hostname `h`, every TLSA record must live at `_25._tcp.h`.
//!
//! - **Add** each authoritative TLSA record whose `(_25._tcp.h, content)` pair is not
//!   already published. Content is compared in the form it is published in: the
//!   parsed fields joined by single spaces (`03 1 1  ab` compares as `3 1 1 ab`).
//!   Content that does not parse only has its whitespace collapsed.
//! - **Delete** each published record whose content is not in the authoritative content
//!   set (any record type), or whose name is not exactly `_25._tcp.h`, or that repeats a
//!   `(name, content)` pair already kept. Content is canonicalized here as well.
//! - **Skip** authoritative TLSA records whose content does not parse as
//!   `usage selector matching-type certificate`.

use std::collections::HashSet;
use tracing::warn;

use crate::constants::TLSA_CONTENT_FIELDS;
use crate::errors::SyncError;
use crate::records::{
    canonical_content, canonical_name, DnsRecord, ExternalTlsaRecord, SkippedRecord, TlsaData,
};

/// An authoritative TLSA record ready to be published for one hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsaCandidate {
    /// Record as reported back: canonical name, raw authoritative content
    pub record: DnsRecord,
    /// Parsed fields sent to the provider
    pub data: TlsaData,
}

/// Result of [`compute_additions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsaAdditions {
    pub candidates: Vec<TlsaCandidate>,
    pub skipped: Vec<SkippedRecord>,
}

/// Split TLSA content into its four fields.
///
/// # Errors
///
/// Returns [`SyncError::MalformedRecord`] unless the content has exactly four
/// whitespace-separated fields, the first three are numbers in `0..=255` and the
/// certificate association data is hex.
pub fn parse_tlsa_content(name: &str, content: &str) -> Result<TlsaData, SyncError> {
    let malformed = |reason: String| SyncError::MalformedRecord {
        name: name.to_string(),
        content: content.to_string(),
        reason,
    };

    let fields: Vec<&str> = content.split_whitespace().collect();
    let [usage, selector, matching_type, certificate] = fields[..] else {
        return Err(malformed(format!(
            "expected {TLSA_CONTENT_FIELDS} fields, found {}",
            fields.len()
        )));
    };

    let number = |field: &str, value: &str| {
        value
            .parse::<u8>()
            .map_err(|_| malformed(format!("{field} '{value}' is not a number between 0 and 255")))
    };

    if !certificate.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(format!(
            "certificate data '{certificate}' is not hexadecimal"
        )));
    }

    Ok(TlsaData {
        usage: number("usage", usage)?,
        selector: number("selector", selector)?,
        matching_type: number("matching type", matching_type)?,
        certificate: certificate.to_string(),
    })
}

/// Content in the form it takes once published: parsed TLSA fields when it parses,
/// whitespace-collapsed otherwise.
fn comparable_content(content: &str) -> String {
    parse_tlsa_content("", content)
        .map(|data| data.to_string())
        .unwrap_or_else(|_| canonical_content(content))
}

/// Authoritative TLSA records that still need to be published for `hostname`.
///
/// Records whose canonical name and canonical content already exist in `existing` are left
/// out, as are repeats of the same content within `authoritative`. Malformed records
/// are reported in [`TlsaAdditions::skipped`] instead of failing the computation.
#[must_use]
pub fn compute_additions(
    authoritative: &[DnsRecord],
    existing: &[ExternalTlsaRecord],
    hostname: &str,
) -> TlsaAdditions {
    let name = canonical_name(hostname);
    let published: HashSet<(&str, String)> = existing
        .iter()
        .map(|r| (r.name.as_str(), comparable_content(&r.content)))
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut additions = TlsaAdditions::default();

    for record in authoritative.iter().filter(|r| r.is_tlsa()) {
        let data = match parse_tlsa_content(&record.name, &record.content) {
            Ok(data) => data,
            Err(e) => {
                warn!(hostname, name = %record.name, content = %record.content, error = %e, "Skipping malformed TLSA record");
                additions.skipped.push(SkippedRecord {
                    name: record.name.clone(),
                    content: record.content.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let content = data.to_string();
        if published.contains(&(name.as_str(), content.clone())) {
            continue;
        }
        if !seen.insert(content) {
            continue;
        }

        additions.candidates.push(TlsaCandidate {
            record: DnsRecord::tlsa(name.clone(), record.content.clone()),
            data,
        });
    }

    additions
}

/// Published TLSA records for `hostname` that must be removed.
///
/// Membership is tested against the content of every authoritative record, not just
/// the TLSA ones. A record is also removed when its name is not the canonical
/// `_25._tcp.<hostname>`, or when an earlier record already holds the same
/// `(name, content)` pair.
#[must_use]
pub fn compute_deletions(
    authoritative: &[DnsRecord],
    existing: &[ExternalTlsaRecord],
    hostname: &str,
) -> Vec<ExternalTlsaRecord> {
    let name = canonical_name(hostname);
    let wanted: HashSet<String> = authoritative
        .iter()
        .map(|r| comparable_content(&r.content))
        .collect();
    let mut kept: HashSet<String> = HashSet::new();

    existing
        .iter()
        .filter(|record| {
            let content = comparable_content(&record.content);
            let stale = record.name != name || !wanted.contains(&content);
            stale || !kept.insert(content)
        })
        .cloned()
        .collect()
}

/// Everything that has to change for one hostname, computed from a single listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsaDiff {
    pub hostname: String,
    pub additions: Vec<TlsaCandidate>,
    pub deletions: Vec<ExternalTlsaRecord>,
    pub skipped: Vec<SkippedRecord>,
}

impl TlsaDiff {
    /// Compute additions and deletions for `hostname` against the same `existing` listing.
    #[must_use]
    pub fn compute(
        authoritative: &[DnsRecord],
        existing: &[ExternalTlsaRecord],
        hostname: &str,
    ) -> Self {
        let TlsaAdditions {
            candidates,
            skipped,
        } = compute_additions(authoritative, existing, hostname);

        Self {
            hostname: hostname.to_string(),
            additions: candidates,
            deletions: compute_deletions(authoritative, existing, hostname),
            skipped,
        }
    }

    /// True when the provider already matches the authoritative set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}
