//! Controller configuration, read once from environment variables.

use crate::backoff::RetryPolicy;
use crate::error::ControllerError;
use crate::reconciler::ReconcilerSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_LEGACY_SPEC_ANNOTATION: &str = "old/spec";

/// Immutable process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub reconcile_timeout: Duration,
    /// Requeue delay after a successful reconcile
    pub resync_interval: Duration,
    pub retry: RetryPolicy,
    pub concurrency: u16,
    pub debounce: Duration,
    /// Key of the legacy spec snapshot annotation; `None` disables the check
    pub legacy_spec_annotation: Option<String>,
    /// Mirror Deployment status onto the AppService
    pub status_sync: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            reconcile_timeout: Duration::from_secs(30),
            resync_interval: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            concurrency: 3,
            debounce: Duration::from_secs(1),
            legacy_spec_annotation: Some(DEFAULT_LEGACY_SPEC_ANNOTATION.to_string()),
            status_sync: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "CONFLICT_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
            initial_delay: Duration::from_millis(parse_or(
                &get,
                "CONFLICT_RETRY_DELAY_MS",
                duration_millis(defaults.retry.initial_delay),
            )?),
            max_delay: defaults.retry.max_delay,
        };
        if retry.max_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONFLICT_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let concurrency = parse_or(&get, "CONTROLLER_CONCURRENCY", defaults.concurrency)?;
        if concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let legacy_spec_annotation = match get("LEGACY_SPEC_ANNOTATION") {
            Some(key) if key.is_empty() => None,
            Some(key) => Some(key),
            None => defaults.legacy_spec_annotation,
        };

        Ok(Self {
            namespace: get("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            reconcile_timeout: Duration::from_secs(parse_or(
                &get,
                "RECONCILE_TIMEOUT_SECS",
                defaults.reconcile_timeout.as_secs(),
            )?),
            resync_interval: Duration::from_secs(parse_or(
                &get,
                "RESYNC_INTERVAL_SECS",
                defaults.resync_interval.as_secs(),
            )?),
            retry,
            concurrency,
            debounce: Duration::from_secs(parse_or(&get, "DEBOUNCE_SECS", defaults.debounce.as_secs())?),
            legacy_spec_annotation,
            status_sync: parse_or(&get, "STATUS_SYNC", defaults.status_sync)?,
        })
    }

    /// The subset the reconciler needs.
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            retry: self.retry,
            legacy_spec_annotation: self.legacy_spec_annotation.clone(),
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) if raw.is_empty() => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
    }
}
