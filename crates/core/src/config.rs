//! Configuration resolution.
//!
//! [`ConfigResolver`] reads named slots from a [`ConfigSource`] and
//! produces an immutable [`Configuration`]. The resolved value is built
//! once and handed to the clients and the dispatcher by reference; there
//! is no process-global cache.
//!
//! | Slot                        | Required | Default                    |
//! |-----------------------------|----------|----------------------------|
//! | `ELASTIC_API_KEY`           | yes      | --                         |
//! | `PERSISTENT_API_KEY`        | no       | --                         |
//! | `PERSISTENT_BASE_URL`       | no       | --                         |
//! | `ELASTIC_BASE_URL`          | no       | `https://api.runpod.ai/v2` |
//! | `MODE_ENDPOINTS`            | no       | empty (`mode=id,...`)      |
//! | `ENDPOINT_ID_<MODE>`        | no       | --                         |
//! | `POD_TIMEOUT_SECS`          | no       | `600`                      |
//! | `ELASTIC_SYNC_TIMEOUT_SECS` | no       | `700`                      |
//! | `POLL_INTERVAL_SECS`        | no       | `1`                        |
//! | `MAX_POLL_DURATION_SECS`    | no       | `180`                      |
//! | `MAX_POLL_ATTEMPTS`         | no       | `120`                      |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

// Slot names, see the table above.
pub const ELASTIC_API_KEY: &str = "ELASTIC_API_KEY";
pub const PERSISTENT_API_KEY: &str = "PERSISTENT_API_KEY";
pub const PERSISTENT_BASE_URL: &str = "PERSISTENT_BASE_URL";
pub const ELASTIC_BASE_URL: &str = "ELASTIC_BASE_URL";
pub const MODE_ENDPOINTS: &str = "MODE_ENDPOINTS";
pub const ENDPOINT_ID_PREFIX: &str = "ENDPOINT_ID_";
pub const POD_TIMEOUT_SECS: &str = "POD_TIMEOUT_SECS";
pub const ELASTIC_SYNC_TIMEOUT_SECS: &str = "ELASTIC_SYNC_TIMEOUT_SECS";
pub const POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const MAX_POLL_DURATION_SECS: &str = "MAX_POLL_DURATION_SECS";
pub const MAX_POLL_ATTEMPTS: &str = "MAX_POLL_ATTEMPTS";

// Defaults for optional slots.
pub const DEFAULT_ELASTIC_BASE_URL: &str = "https://api.runpod.ai/v2";
pub const DEFAULT_POD_TIMEOUT_SECS: f64 = 600.0;
pub const DEFAULT_ELASTIC_SYNC_TIMEOUT_SECS: f64 = 700.0;
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_MAX_POLL_DURATION_SECS: f64 = 180.0;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A key/value store of named configuration slots.
pub trait ConfigSource {
    /// Value of a slot. Blank values are treated as absent by the resolver.
    fn get(&self, key: &str) -> Option<String>;

    /// Every slot name the source knows about.
    fn keys(&self) -> Vec<String>;
}

/// Reads slots from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    /// Names that are not valid UTF-8 are skipped; no slot can use them.
    fn keys(&self) -> Vec<String> {
        std::env::vars_os()
            .filter_map(|(k, _)| k.into_string().ok())
            .collect()
    }
}

/// In-memory slots, for tests and embedders that load settings elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MapSource(HashMap<String, String>);

impl MapSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a slot, replacing any previous value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// An API credential. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw credential.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw credential, for building auth headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when the credential is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Budgets for the serverless poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub interval: Duration,
    pub max_duration: Duration,
    pub max_attempts: u32,
}

/// Everything the clients and the dispatcher need, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub elastic_api_key: ApiKey,
    pub persistent_api_key: Option<ApiKey>,
    /// Pod base URL without a trailing slash.
    pub persistent_base_url: Option<String>,
    /// Serverless API root; an endpoint lives at `{root}/{endpoint_id}`.
    pub elastic_base_url: String,
    /// Normalized (lower-case) mode -> serverless endpoint id.
    pub mode_endpoints: BTreeMap<String, String>,
    pub pod_timeout: Duration,
    pub elastic_sync_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_duration: Duration,
    pub max_poll_attempts: u32,
}

impl Configuration {
    /// Serverless endpoint id for a mode. Absence is a normal state.
    pub fn endpoint_for(&self, mode: &str) -> Option<&str> {
        self.mode_endpoints
            .get(&normalize_mode(mode))
            .map(String::as_str)
    }

    /// Interval, duration and attempt bounds for the poll loop.
    pub fn poll_budget(&self) -> PollBudget {
        PollBudget {
            interval: self.poll_interval,
            max_duration: self.max_poll_duration,
            max_attempts: self.max_poll_attempts,
        }
    }

    /// Check the invariants the resolver guarantees.
    ///
    /// Callers holding a hand-built `Configuration` get the same checks
    /// before any network I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.elastic_api_key.is_blank() {
            return Err(ConfigError::MissingCredential(ELASTIC_API_KEY));
        }
        let budgets = [
            (POD_TIMEOUT_SECS, self.pod_timeout),
            (ELASTIC_SYNC_TIMEOUT_SECS, self.elastic_sync_timeout),
            (POLL_INTERVAL_SECS, self.poll_interval),
            (MAX_POLL_DURATION_SECS, self.max_poll_duration),
        ];
        for (key, value) in budgets {
            if value.is_zero() {
                return Err(ConfigError::NonPositive { key });
            }
        }
        if self.max_poll_attempts == 0 {
            return Err(ConfigError::NonPositive {
                key: MAX_POLL_ATTEMPTS,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves a [`Configuration`] from a [`ConfigSource`].
///
/// Resolution is a pure function of the source: resolving twice against
/// unchanged slots yields equal values.
#[derive(Debug, Clone)]
pub struct ConfigResolver<S> {
    source: S,
}

impl ConfigResolver<EnvSource> {
    /// Resolver over the process environment.
    pub fn from_env() -> Self {
        Self::new(EnvSource)
    }
}

impl<S: ConfigSource> ConfigResolver<S> {
    /// Resolver over an arbitrary source.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Resolve and validate every slot.
    pub fn resolve(&self) -> Result<Configuration, ConfigError> {
        let elastic_api_key = self
            .slot(ELASTIC_API_KEY)
            .map(ApiKey::new)
            .ok_or(ConfigError::MissingCredential(ELASTIC_API_KEY))?;

        let persistent_base_url = self
            .slot(PERSISTENT_BASE_URL)
            .map(|url| parse_base_url(PERSISTENT_BASE_URL, &url))
            .transpose()?;

        let elastic_base_url = match self.slot(ELASTIC_BASE_URL) {
            Some(url) => parse_base_url(ELASTIC_BASE_URL, &url)?,
            None => DEFAULT_ELASTIC_BASE_URL.to_string(),
        };

        let config = Configuration {
            elastic_api_key,
            persistent_api_key: self.slot(PERSISTENT_API_KEY).map(ApiKey::new),
            persistent_base_url,
            elastic_base_url,
            mode_endpoints: self.mode_endpoints()?,
            pod_timeout: self.seconds(POD_TIMEOUT_SECS, DEFAULT_POD_TIMEOUT_SECS)?,
            elastic_sync_timeout: self
                .seconds(ELASTIC_SYNC_TIMEOUT_SECS, DEFAULT_ELASTIC_SYNC_TIMEOUT_SECS)?,
            poll_interval: self.seconds(POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS)?,
            max_poll_duration: self
                .seconds(MAX_POLL_DURATION_SECS, DEFAULT_MAX_POLL_DURATION_SECS)?,
            max_poll_attempts: self.count(MAX_POLL_ATTEMPTS, DEFAULT_MAX_POLL_ATTEMPTS)?,
        };
        config.validate()?;

        tracing::debug!(
            modes = config.mode_endpoints.len(),
            pod = config.persistent_base_url.is_some(),
            "Configuration resolved",
        );
        Ok(config)
    }

    /// Serverless endpoint id for a mode, without requiring credentials.
    ///
    /// Returns `None` for unconfigured modes and when the mode table
    /// itself cannot be parsed.
    pub fn endpoint_for(&self, mode: &str) -> Option<String> {
        self.mode_endpoints().ok()?.remove(&normalize_mode(mode))
    }

    // ---- private helpers ----

    /// Trimmed slot value; blank counts as absent.
    fn slot(&self, key: &str) -> Option<String> {
        self.source
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// `MODE_ENDPOINTS` pairs, overridden by `ENDPOINT_ID_<MODE>` slots.
    fn mode_endpoints(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut endpoints = BTreeMap::new();

        if let Some(raw) = self.slot(MODE_ENDPOINTS) {
            for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (mode, endpoint) = pair
                    .split_once('=')
                    .map(|(m, e)| (normalize_mode(m), e.trim().to_string()))
                    .filter(|(m, e)| !m.is_empty() && !e.is_empty())
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: MODE_ENDPOINTS,
                        value: pair.to_string(),
                        reason: "expected mode=endpoint_id".into(),
                    })?;
                endpoints.insert(mode, endpoint);
            }
        }

        let mut keys = self.source.keys();
        keys.sort();
        for key in keys {
            let Some(mode) = key.strip_prefix(ENDPOINT_ID_PREFIX) else {
                continue;
            };
            let mode = normalize_mode(mode);
            if mode.is_empty() {
                continue;
            }
            if let Some(endpoint) = self.slot(&key) {
                endpoints.insert(mode, endpoint);
            }
        }

        Ok(endpoints)
    }

    fn seconds(&self, key: &'static str, default: f64) -> Result<Duration, ConfigError> {
        let Some(raw) = self.slot(key) else {
            return Ok(Duration::from_secs_f64(default));
        };
        let secs: f64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: "expected a number of seconds".into(),
        })?;
        if !secs.is_finite() {
            return Err(ConfigError::InvalidValue {
                key,
                value: raw,
                reason: "must be finite".into(),
            });
        }
        if secs <= 0.0 {
            return Err(ConfigError::NonPositive { key });
        }
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "too large".into(),
        })
    }

    fn count(&self, key: &'static str, default: u32) -> Result<u32, ConfigError> {
        let Some(raw) = self.slot(key) else {
            return Ok(default);
        };
        let n: i64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
            reason: "expected an integer".into(),
        })?;
        if n <= 0 {
            return Err(ConfigError::NonPositive { key });
        }
        u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: "too large".into(),
        })
    }
}

/// Modes are matched case-insensitively, ignoring surrounding whitespace.
pub fn normalize_mode(mode: &str) -> String {
    mode.trim().to_lowercase()
}

fn parse_base_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = raw.trim().trim_end_matches('/');
    let has_host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .is_some_and(|rest| !rest.is_empty());
    if !has_host {
        return Err(ConfigError::InvalidUrl {
            key,
            value: raw.to_string(),
        });
    }
    Ok(url.to_string())
}
