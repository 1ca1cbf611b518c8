//! Process configuration, read once at boot from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use contentgate_auth::{ConditionMode, EnforcementMode, InheritanceMode, PipelineSettings};
use contentgate_core::{GateError, GateResult};

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 30;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PATH_PREFIX: &str = "/api/";

/// Where bearer credentials are verified.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityConfig {
    /// Local HS256 verification with a shared secret.
    Jwt { secret: String, audience: Option<String> },
    /// Hosted auth service (`GET {url}/auth/v1/user`).
    Remote { url: String, api_key: String },
}

// Secrets stay out of logs.
impl core::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IdentityConfig::Jwt { audience, .. } => f
                .debug_struct("Jwt")
                .field("secret", &"<redacted>")
                .field("audience", audience)
                .finish(),
            IdentityConfig::Remote { url, .. } => f
                .debug_struct("Remote")
                .field("url", url)
                .field("api_key", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub identity: IdentityConfig,
    /// Absent: run against an empty in-memory source (every tagged route denies).
    pub database_url: Option<String>,
    pub snapshot_ttl: Duration,
    pub upstream_timeout: Duration,
    /// Whole-request bound, handler included.
    pub request_timeout: Duration,
    pub inheritance: InheritanceMode,
    pub condition_mode: ConditionMode,
    pub enforcement: EnforcementMode,
    pub path_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> GateResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> GateResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = parse_or(var("CONTENTGATE_BIND"), "CONTENTGATE_BIND", DEFAULT_BIND)?;

        let identity = match var("IDENTITY_PROVIDER").as_deref().unwrap_or("jwt") {
            "jwt" => IdentityConfig::Jwt {
                secret: required(var("JWT_SECRET"), "JWT_SECRET")?,
                audience: var("JWT_AUDIENCE"),
            },
            "remote" => IdentityConfig::Remote {
                url: required(var("IDENTITY_PROVIDER_URL"), "IDENTITY_PROVIDER_URL")?,
                api_key: required(var("IDENTITY_PROVIDER_KEY"), "IDENTITY_PROVIDER_KEY")?,
            },
            other => {
                return Err(GateError::configuration(format!(
                    "IDENTITY_PROVIDER must be 'jwt' or 'remote', got '{other}'"
                )));
            }
        };

        let ttl_secs: u64 = parse_or(var("SNAPSHOT_TTL_SECS"), "SNAPSHOT_TTL_SECS", DEFAULT_SNAPSHOT_TTL_SECS)?;
        let timeout_ms: u64 = parse_or(
            var("UPSTREAM_TIMEOUT_MS"),
            "UPSTREAM_TIMEOUT_MS",
            DEFAULT_UPSTREAM_TIMEOUT_MS,
        )?;
        if timeout_ms == 0 {
            return Err(GateError::configuration("UPSTREAM_TIMEOUT_MS must be positive"));
        }
        let request_timeout_ms: u64 = parse_or(
            var("REQUEST_TIMEOUT_MS"),
            "REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        if request_timeout_ms == 0 {
            return Err(GateError::configuration("REQUEST_TIMEOUT_MS must be positive"));
        }

        let path_prefix = var("PATH_PREFIX").unwrap_or_else(|| DEFAULT_PATH_PREFIX.to_string());
        if !path_prefix.starts_with('/') {
            return Err(GateError::configuration("PATH_PREFIX must start with '/'"));
        }

        Ok(Self {
            bind,
            identity,
            database_url: var("DATABASE_URL"),
            snapshot_ttl: Duration::from_secs(ttl_secs),
            upstream_timeout: Duration::from_millis(timeout_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            inheritance: var("INHERITANCE_MODE").map(|v| v.parse()).transpose()?.unwrap_or_default(),
            condition_mode: var("CONDITION_MODE").map(|v| v.parse()).transpose()?.unwrap_or_default(),
            enforcement: var("ENFORCEMENT_MODE").map(|v| v.parse()).transpose()?.unwrap_or_default(),
            path_prefix,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            inheritance: self.inheritance,
            condition_mode: self.condition_mode,
            enforcement: self.enforcement,
            path_prefix: self.path_prefix.clone(),
            condition_timeout: self.upstream_timeout,
        }
    }
}

fn required(value: Option<String>, key: &str) -> GateResult<String> {
    value.ok_or_else(|| GateError::configuration(format!("{key} must be set")))
}

fn parse_or<T, D>(value: Option<String>, key: &str, default: D) -> GateResult<T>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    D: ToString,
{
    let raw = value.unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|e| GateError::configuration(format!("invalid {key} '{raw}': {e}")))
}
