// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare DNS provider client.
//!
//! Covers the four v4 API calls reconciliation needs:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | resolve zone | `GET {base}/zones?name={domain}` |
//! | list TLSA records | `GET {base}/zones/{zone_id}/dns_records?type=TLSA&name=_25._tcp.{hostname}` |
//! | create TLSA record | `POST {base}/zones/{zone_id}/dns_records` |
//! | delete record | `DELETE {base}/zones/{zone_id}/dns_records/{record_id}` |
//!
//! Every response is wrapped in Cloudflare's `{success, errors, result}` envelope.
//! A 2xx response with `success: false` is still treated as a failure.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::{CloudflareConfig, Secret};
use crate::constants::{SERVICE_CLOUDFLARE, TLSA_RECORD_TYPE};
use crate::errors::SyncError;
use crate::records::{canonical_name, ExternalTlsaRecord, TlsaData, Zone};
use crate::upstream::{endpoint, send_json};

/// Read/create/delete access to TLSA records in the external DNS zone.
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    /// Look up the zone for `domain`.
    ///
    /// # Errors
    ///
    /// [`SyncError::ZoneNotFound`] when the provider has no such zone,
    /// [`SyncError::Upstream`] for any other failure.
    async fn resolve_zone(&self, domain: &str) -> Result<Zone, SyncError>;

    /// List TLSA records named `_25._tcp.<hostname>` in the zone.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Upstream`] if the listing fails.
    async fn list_tlsa_records(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<Vec<ExternalTlsaRecord>, SyncError>;

    /// Publish a TLSA record under `_25._tcp.<hostname>`. Records are never proxied.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Upstream`] if the provider rejects the record.
    async fn create_tlsa_record(
        &self,
        zone_id: &str,
        hostname: &str,
        data: &TlsaData,
    ) -> Result<(), SyncError>;

    /// Delete a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Upstream`] if the record is gone or the call is rejected.
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError>;
}

/// One entry of Cloudflare's `errors` / `messages` arrays.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudflareMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Cloudflare's standard response envelope.
#[derive(Debug, Deserialize)]
pub struct CloudflareResponse<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<CloudflareMessage>,
    pub result: Option<T>,
}

fn default_success() -> bool {
    true
}

impl<T> CloudflareResponse<T> {
    /// Unwrap the envelope, turning `success: false` into an upstream error.
    fn into_result(self, operation: &'static str) -> Result<Option<T>, SyncError> {
        if self.success {
            return Ok(self.result);
        }
        let reason = if self.errors.is_empty() {
            "request reported success=false".to_string()
        } else {
            self.errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(SyncError::upstream(SERVICE_CLOUDFLARE, operation, reason))
    }
}

/// Request body for creating a TLSA record.
#[derive(Debug, Serialize)]
struct CreateTlsaRecordRequest<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    data: &'a TlsaData,
    proxied: bool,
}

/// HTTP client for the Cloudflare v4 API.
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    http: HttpClient,
    api_url: Url,
    api_key: Secret,
}

impl CloudflareClient {
    pub fn new(http: HttpClient, api_url: Url, api_key: Secret) -> Self {
        Self {
            http,
            api_url,
            api_key,
        }
    }

    pub fn from_config(http: HttpClient, config: &CloudflareConfig) -> Self {
        Self::new(http, config.api_url.clone(), config.api_key.clone())
    }

    fn dns_records_url(&self, zone_id: &str) -> Url {
        endpoint(&self.api_url, &["zones", zone_id, "dns_records"])
    }
}

#[async_trait]
impl ZoneProvider for CloudflareClient {
    async fn resolve_zone(&self, domain: &str) -> Result<Zone, SyncError> {
        let mut url = endpoint(&self.api_url, &["zones"]);
        url.query_pairs_mut().append_pair("name", domain);

        let request = self.http.get(url.clone()).bearer_auth(self.api_key.expose());
        let response: CloudflareResponse<Vec<Zone>> =
            send_json(request, SERVICE_CLOUDFLARE, "resolve_zone", &url).await?;

        let zone = response
            .into_result("resolve_zone")?
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::ZoneNotFound {
                domain: domain.to_string(),
            })?;

        debug!(domain, zone_id = %zone.id, "Resolved Cloudflare zone");
        Ok(zone)
    }

    async fn list_tlsa_records(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<Vec<ExternalTlsaRecord>, SyncError> {
        let name = canonical_name(hostname);
        let mut url = self.dns_records_url(zone_id);
        url.query_pairs_mut()
            .append_pair("type", TLSA_RECORD_TYPE)
            .append_pair("name", &name);

        let request = self.http.get(url.clone()).bearer_auth(self.api_key.expose());
        let response: CloudflareResponse<Vec<ExternalTlsaRecord>> =
            send_json(request, SERVICE_CLOUDFLARE, "list_tlsa_records", &url).await?;

        let records = response.into_result("list_tlsa_records")?.unwrap_or_default();
        debug!(zone_id, name = %name, count = records.len(), "Listed Cloudflare TLSA records");
        Ok(records)
    }

    async fn create_tlsa_record(
        &self,
        zone_id: &str,
        hostname: &str,
        data: &TlsaData,
    ) -> Result<(), SyncError> {
        let name = canonical_name(hostname);
        let url = self.dns_records_url(zone_id);
        let body = CreateTlsaRecordRequest {
            record_type: TLSA_RECORD_TYPE,
            name: &name,
            data,
            proxied: false,
        };

        let request = self
            .http
            .post(url.clone())
            .bearer_auth(self.api_key.expose())
            .json(&body);
        let response: CloudflareResponse<serde_json::Value> =
            send_json(request, SERVICE_CLOUDFLARE, "create_tlsa_record", &url).await?;
        response.into_result("create_tlsa_record")?;

        info!(zone_id, name = %name, content = %data, "Created TLSA record");
        Ok(())
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        let url = endpoint(&self.api_url, &["zones", zone_id, "dns_records", record_id]);

        let request = self
            .http
            .delete(url.clone())
            .bearer_auth(self.api_key.expose());
        let response: CloudflareResponse<serde_json::Value> =
            send_json(request, SERVICE_CLOUDFLARE, "delete_record", &url).await?;
        response.into_result("delete_record")?;

        info!(zone_id, record_id, "Deleted DNS record");
        Ok(())
    }
}
