// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared HTTP plumbing for the upstream API clients.
//!
//! Every outbound call goes through [`send_json`], which logs the request, turns
//! transport failures and non-success statuses into [`SyncError::Upstream`], and
//! decodes the JSON body. There is no retry: a failed call aborts the current run.

use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::errors::SyncError;
use crate::http_errors::{map_connection_error, map_http_error_to_reason};
use crate::metrics;

/// Build an HTTP client with the given request timeout.
///
/// # Errors
///
/// Returns [`SyncError::Config`] if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> Result<HttpClient, SyncError> {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(concat!("tlsa-sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::Config {
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

/// Append path segments to an API base URL.
///
/// `https://api.example.com/v4` + `["zones", "abc"]` becomes
/// `https://api.example.com/v4/zones/abc`. Segments are percent-encoded.
#[must_use]
pub fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Send a request and decode its JSON response body.
///
/// # Arguments
/// * `request` - Fully built request (method, URL, auth, body)
/// * `service` - Upstream service label for errors, logs and metrics
/// * `operation` - Operation name for errors and logs
/// * `url` - Target URL, used for logging only
///
/// # Errors
///
/// Returns [`SyncError::Upstream`] when the request cannot be sent, the status is not
/// 2xx, or the body is not the expected JSON.
pub async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    service: &'static str,
    operation: &'static str,
    url: &Url,
) -> Result<T, SyncError> {
    debug!(service, operation, url = %url, "HTTP API request");

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            let (reason, message) = map_connection_error(service);
            error!(service, operation, url = %url, error = %e, reason, "HTTP API request failed to send");
            metrics::record_upstream_error(service, reason);
            return Err(SyncError::Upstream {
                service,
                operation,
                status: None,
                reason: format!("{message}: {e}"),
            });
        }
    };

    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let (reason, message) = map_http_error_to_reason(service, status.as_u16());
        error!(
            service,
            operation,
            url = %url,
            status = %status,
            error = %error_text,
            reason,
            "HTTP API request failed"
        );
        metrics::record_upstream_error(service, reason);
        return Err(SyncError::Upstream {
            service,
            operation,
            status: Some(status.as_u16()),
            reason: format!("{message}: {error_text}"),
        });
    }

    let text = response.text().await.map_err(|e| {
        let (reason, message) = map_connection_error(service);
        metrics::record_upstream_error(service, reason);
        SyncError::Upstream {
            service,
            operation,
            status: Some(status.as_u16()),
            reason: format!("{message}: failed to read response body: {e}"),
        }
    })?;

    serde_json::from_str(&text).map_err(|e| {
        let (reason, message) = map_http_error_to_reason(service, status.as_u16());
        error!(service, operation, url = %url, error = %e, reason, "Unexpected HTTP API response body");
        metrics::record_upstream_error(service, reason);
        SyncError::Upstream {
            service,
            operation,
            status: Some(status.as_u16()),
            reason: format!("{message}: {e}"),
        }
    })
}
