// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for tlsa-sync.
//!
//! A single [`SyncError`] covers every failure the service can report:
//! - trigger authentication failures
//! - upstream API failures (Stalwart record source, Cloudflare DNS provider)
//! - a missing Cloudflare zone
//! - malformed TLSA content in the authoritative record set
//! - guard store unavailability
//! - invalid configuration at startup
//! - a run task that died without producing a result
//!
//! Only [`SyncError::MalformedRecord`] is non-fatal: the reconciler records it and
//! moves on. Every other variant aborts the run it occurs in.

use thiserror::Error;

/// Errors that can occur while triggering or running a TLSA reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The trigger request carried a missing or wrong API key.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// What was wrong with the presented credentials
        reason: String,
    },

    /// An upstream API call failed (transport error, non-success status or bad payload).
    ///
    /// No retry is attempted; the run is aborted and whatever was already applied stays applied.
    #[error("{service} {operation} failed{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        /// Upstream service label (`stalwart` or `cloudflare`)
        service: &'static str,
        /// Operation that failed (e.g. `list_tlsa_records`)
        operation: &'static str,
        /// HTTP status code when a response was received
        status: Option<u16>,
        /// Human-readable explanation
        reason: String,
    },

    /// The DNS provider has no zone for the configured domain.
    #[error("Zone '{domain}' not found at DNS provider")]
    ZoneNotFound {
        /// The domain that was looked up
        domain: String,
    },

    /// An authoritative TLSA record whose content cannot be split into usable fields.
    #[error("Malformed TLSA record '{name}' with content '{content}': {reason}")]
    MalformedRecord {
        /// Owner name of the authoritative record
        name: String,
        /// Raw content string
        content: String,
        /// Why the content was rejected
        reason: String,
    },

    /// The guard store could not be reached or answered unexpectedly.
    #[error("Guard store error: {reason}")]
    Guard {
        /// Underlying failure
        reason: String,
    },

    /// The reconciliation task ended without a result (it panicked or was torn down).
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// How the task ended
        reason: String,
    },

    /// Invalid or missing configuration.
    #[error("Invalid configuration: {reason}")]
    Config {
        /// Which setting is wrong and why
        reason: String,
    },
}

impl SyncError {
    /// Shorthand for an [`SyncError::Upstream`] without an HTTP status.
    pub fn upstream(service: &'static str, operation: &'static str, reason: impl ToString) -> Self {
        Self::Upstream {
            service,
            operation,
            status: None,
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures caused by one of the upstream APIs.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::ZoneNotFound { .. })
    }

    /// HTTP status code the trigger endpoint answers with for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 401,
            Self::Upstream { .. } | Self::ZoneNotFound { .. } => 502,
            Self::Guard { .. } => 503,
            Self::MalformedRecord { .. } | Self::Aborted { .. } | Self::Config { .. } => 500,
        }
    }

    /// Stable reason label, used for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Unauthorized",
            Self::Upstream { .. } => "UpstreamError",
            Self::ZoneNotFound { .. } => "ZoneNotFound",
            Self::MalformedRecord { .. } => "MalformedRecord",
            Self::Guard { .. } => "GuardUnavailable",
            Self::Aborted { .. } => "RunAborted",
            Self::Config { .. } => "InvalidConfiguration",
        }
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(err: redis::RedisError) -> Self {
        Self::Guard {
            reason: err.to_string(),
        }
    }
}
