// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service configuration.
//!
//! All settings come from the environment and are read exactly once at startup into
//! an immutable [`Config`]. Components receive the pieces they need by reference.
//!
//! | Variable | Required | Default |
//! |----------|----------|---------|
//! | `API_KEY` | yes | |
//! | `REDIS_URL` | no | in-process guard |
//! | `STALWART_API_URL` | yes | |
//! | `STALWART_DOMAIN` | yes | |
//! | `STALWART_API_KEY` | yes | |
//! | `STALWART_HOSTNAMES` | yes | |
//! | `CLOUDFLARE_API_URL` | no | `https://api.cloudflare.com/client/v4` |
//! | `CLOUDFLARE_API_KEY` | yes | |
//! | `GUARD_TTL_SECS` | no | 300 |
//! | `HTTP_TIMEOUT_SECS` | no | 30 |

use std::fmt;
use std::time::Duration;
use url::Url;

use crate::constants::{DEFAULT_CLOUDFLARE_API_URL, DEFAULT_GUARD_TTL_SECS, DEFAULT_HTTP_TIMEOUT_SECS};
use crate::errors::SyncError;

/// A credential whose value never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Stalwart mail server (authoritative record source) settings.
#[derive(Debug, Clone)]
pub struct StalwartConfig {
    pub api_url: Url,
    pub api_key: Secret,
    /// Domain whose records are fetched; also the Cloudflare zone name
    pub domain: String,
    /// Mail hostnames that need TLSA coverage, in configuration order
    pub hostnames: Vec<String>,
}

/// Cloudflare (external DNS provider) settings.
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub api_url: Url,
    pub api_key: Secret,
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secret expected in the trigger's `x-api-key` header
    pub api_key: Secret,
    /// Guard store connection; `None` selects the in-process guard
    pub redis_url: Option<Secret>,
    pub stalwart: StalwartConfig,
    pub cloudflare: CloudflareConfig,
    pub guard_ttl: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] naming the first missing or invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            optional(key).ok_or_else(|| SyncError::Config {
                reason: format!("{key} is not set"),
            })
        };

        let hostnames = parse_hostnames(&required("STALWART_HOSTNAMES")?);
        if hostnames.is_empty() {
            return Err(SyncError::Config {
                reason: "STALWART_HOSTNAMES contains no hostnames".to_string(),
            });
        }

        let cloudflare_url = optional("CLOUDFLARE_API_URL")
            .unwrap_or_else(|| DEFAULT_CLOUDFLARE_API_URL.to_string());

        Ok(Self {
            api_key: Secret::new(required("API_KEY")?),
            redis_url: optional("REDIS_URL").map(Secret::new),
            stalwart: StalwartConfig {
                api_url: parse_url("STALWART_API_URL", &required("STALWART_API_URL")?)?,
                api_key: Secret::new(required("STALWART_API_KEY")?),
                domain: required("STALWART_DOMAIN")?,
                hostnames,
            },
            cloudflare: CloudflareConfig {
                api_url: parse_url("CLOUDFLARE_API_URL", &cloudflare_url)?,
                api_key: Secret::new(required("CLOUDFLARE_API_KEY")?),
            },
            guard_ttl: parse_secs("GUARD_TTL_SECS", optional("GUARD_TTL_SECS"), DEFAULT_GUARD_TTL_SECS)?,
            http_timeout: parse_secs(
                "HTTP_TIMEOUT_SECS",
                optional("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?,
        })
    }
}

/// Split a comma-separated hostname list, trimming entries and dropping blanks and repeats.
#[must_use]
pub fn parse_hostnames(raw: &str) -> Vec<String> {
    let mut hostnames: Vec<String> = Vec::new();
    for hostname in raw.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        if !hostnames.iter().any(|h| h == hostname) {
            hostnames.push(hostname.to_string());
        }
    }
    hostnames
}

fn parse_url(key: &str, value: &str) -> Result<Url, SyncError> {
    let url = Url::parse(value).map_err(|e| SyncError::Config {
        reason: format!("{key} is not a valid URL: {e}"),
    })?;
    if url.cannot_be_a_base() {
        return Err(SyncError::Config {
            reason: format!("{key} cannot be used as a base URL: {value}"),
        });
    }
    Ok(url)
}

fn parse_secs(key: &str, value: Option<String>, default: u64) -> Result<Duration, SyncError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(SyncError::Config {
            reason: format!("{key} must be a positive number of seconds, got '{value}'"),
        }),
    }
}
