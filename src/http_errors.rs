// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP error code mapping for upstream API responses.
//!
//! Both upstream services (the Stalwart record source and the Cloudflare DNS
//! provider) report failures through HTTP status codes. This module turns those
//! codes into stable reason labels and readable messages, so error logs and the
//! `upstream_errors_total` metric stay consistent across services.
//!
//! # Usage
//!
//! ```rust
//! use tlsa_sync::http_errors::map_http_error_to_reason;
//!
//! let (reason, message) = map_http_error_to_reason("cloudflare", 404);
//! assert_eq!(reason, "NotFound");
//! assert!(message.contains("404"));
//! ```

/// Request was rejected as invalid (400, 422)
pub const REASON_BAD_REQUEST: &str = "BadRequest";

/// Credentials were missing, expired or lacked permission (401, 403)
pub const REASON_AUTH_FAILED: &str = "AuthFailed";

/// Resource does not exist (404)
pub const REASON_NOT_FOUND: &str = "NotFound";

/// Upstream rate limit hit (429)
pub const REASON_RATE_LIMITED: &str = "RateLimited";

/// Upstream internal failure (500)
pub const REASON_INTERNAL_ERROR: &str = "InternalError";

/// Gateway or availability problem in front of the upstream (502, 503, 504)
pub const REASON_GATEWAY_ERROR: &str = "GatewayError";

/// No HTTP response was received at all
pub const REASON_UNREACHABLE: &str = "Unreachable";

/// A response arrived but its body could not be understood
pub const REASON_INVALID_RESPONSE: &str = "InvalidResponse";

/// Any other status code
pub const REASON_UNEXPECTED_STATUS: &str = "UnexpectedStatus";

/// Map an upstream HTTP status code to a reason label and message.
///
/// # Arguments
///
/// * `service` - Upstream service label, used in the message
/// * `status_code` - HTTP status code returned by the upstream
///
/// # HTTP Code Mapping
///
/// | HTTP Code | Reason |
/// |-----------|--------|
/// | 2xx | `InvalidResponse` (body could not be decoded) |
/// | 400, 422 | `BadRequest` |
/// | 401, 403 | `AuthFailed` |
/// | 404 | `NotFound` |
/// | 429 | `RateLimited` |
/// | 500 | `InternalError` |
/// | 502, 503, 504 | `GatewayError` |
/// | Other | `UnexpectedStatus` |
#[must_use]
pub fn map_http_error_to_reason(service: &str, status_code: u16) -> (&'static str, String) {
    match status_code {
        200..=299 => (
            REASON_INVALID_RESPONSE,
            format!("Unreadable response body from {service} ({status_code})"),
        ),
        400 | 422 => (
            REASON_BAD_REQUEST,
            format!("Invalid request to {service} API ({status_code})"),
        ),
        401 => (
            REASON_AUTH_FAILED,
            format!("{service} authentication required ({status_code})"),
        ),
        403 => (
            REASON_AUTH_FAILED,
            format!("{service} authorization failed ({status_code})"),
        ),
        404 => (
            REASON_NOT_FOUND,
            format!("Resource not found at {service} ({status_code})"),
        ),
        429 => (
            REASON_RATE_LIMITED,
            format!("{service} rate limit exceeded ({status_code})"),
        ),
        500 => (
            REASON_INTERNAL_ERROR,
            format!("{service} API internal error ({status_code})"),
        ),
        502 => (
            REASON_GATEWAY_ERROR,
            format!("Bad gateway reaching {service} ({status_code})"),
        ),
        503 => (
            REASON_GATEWAY_ERROR,
            format!("{service} service unavailable ({status_code})"),
        ),
        504 => (
            REASON_GATEWAY_ERROR,
            format!("Gateway timeout reaching {service} ({status_code})"),
        ),
        _ => (
            REASON_UNEXPECTED_STATUS,
            format!("Unexpected HTTP status from {service} ({status_code})"),
        ),
    }
}

/// Map a transport failure (no response received) to a reason label and message.
#[must_use]
pub fn map_connection_error(service: &str) -> (&'static str, String) {
    (
        REASON_UNREACHABLE,
        format!("Cannot connect to {service} API"),
    )
}
