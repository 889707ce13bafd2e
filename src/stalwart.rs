// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stalwart record source client.
//!
//! Stalwart publishes the DNS records a mail domain needs (MX, SPF/DKIM TXT, SRV,
//! CNAME and the TLSA records for its current certificates) at
//! `GET {base}/dns/records/{domain}`, wrapped as `{"data": [...]}`.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::{Secret, StalwartConfig};
use crate::constants::SERVICE_STALWART;
use crate::errors::SyncError;
use crate::records::DnsRecord;
use crate::upstream::{endpoint, send_json};

/// Source of the authoritative record set.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record the mail server wants published.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Upstream`] on transport failure, non-success status or
    /// a malformed payload.
    async fn fetch(&self) -> Result<Vec<DnsRecord>, SyncError>;
}

#[derive(Debug, Deserialize)]
struct DnsRecordsResponse {
    data: Vec<DnsRecord>,
}

/// HTTP client for the Stalwart management API.
#[derive(Debug, Clone)]
pub struct StalwartClient {
    http: HttpClient,
    api_url: Url,
    api_key: Secret,
    domain: String,
}

impl StalwartClient {
    pub fn new(http: HttpClient, api_url: Url, api_key: Secret, domain: impl Into<String>) -> Self {
        Self {
            http,
            api_url,
            api_key,
            domain: domain.into(),
        }
    }

    pub fn from_config(http: HttpClient, config: &StalwartConfig) -> Self {
        Self::new(
            http,
            config.api_url.clone(),
            config.api_key.clone(),
            config.domain.clone(),
        )
    }
}

#[async_trait]
impl RecordSource for StalwartClient {
    async fn fetch(&self) -> Result<Vec<DnsRecord>, SyncError> {
        let url = endpoint(&self.api_url, &["dns", "records", self.domain.as_str()]);
        let request = self.http.get(url.clone()).bearer_auth(self.api_key.expose());

        let response: DnsRecordsResponse =
            send_json(request, SERVICE_STALWART, "fetch_records", &url).await?;

        debug!(
            domain = %self.domain,
            count = response.data.len(),
            "Fetched authoritative DNS records"
        );
        Ok(response.data)
    }
}
