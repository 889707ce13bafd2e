// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for tlsa-sync.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// DNS Constants
// ============================================================================

/// Owner-name prefix for SMTP TLSA records (port 25 over TCP)
pub const TLSA_NAME_PREFIX: &str = "_25._tcp.";

/// Record type string used by both upstream APIs
pub const TLSA_RECORD_TYPE: &str = "TLSA";

/// Number of whitespace-separated fields in TLSA record content
pub const TLSA_CONTENT_FIELDS: usize = 4;

// ============================================================================
// Upstream API Constants
// ============================================================================

/// Default Cloudflare v4 API base URL
pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Service label for the Stalwart record source
pub const SERVICE_STALWART: &str = "stalwart";

/// Service label for the Cloudflare DNS provider
pub const SERVICE_CLOUDFLARE: &str = "cloudflare";

/// Default outbound HTTP timeout (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Guard Constants
// ============================================================================

/// Key holding the in-flight flag in the guard store
pub const GUARD_KEY: &str = "tlsa-sync:processing";

/// Default lifetime of a guard lease (5 minutes)
pub const DEFAULT_GUARD_TTL_SECS: u64 = 300;

/// The guard lease is renewed this many times per TTL while a run is in progress
pub const GUARD_RENEWALS_PER_TTL: u32 = 3;

// ============================================================================
// HTTP Server Constants
// ============================================================================

/// Header carrying the trigger API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default listen address for the HTTP server
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

/// Path for the liveness endpoint
pub const HEALTHZ_PATH: &str = "/healthz";

/// Path for Prometheus metrics endpoint
pub const METRICS_PATH: &str = "/metrics";

/// Response message for a completed run
pub const MESSAGE_PROCESSED: &str = "Event processed successfully";

/// Response message when another run holds the guard
pub const MESSAGE_ALREADY_PROCESSING: &str = "Event already being processed";

/// Response message when a run fails
pub const MESSAGE_FAILED: &str = "Error processing event";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 2;
