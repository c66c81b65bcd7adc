use skyshelf_daemon::DEFAULT_DAEMON_URL;
use std::{collections::HashMap, env, net::SocketAddr, path::PathBuf, time::Duration};
use thiserror::Error;
use tracing::Level;

use crate::scheduler::SchedulerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not valid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Controller settings, read from `SKYSHELF_*` environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub listen_addr: SocketAddr,
    pub daemon_url: String,
    pub daemon_credentials: Option<(String, String)>,
    pub refresh_interval: Duration,
    pub keepalive: Duration,
    pub probe_batch: usize,
    /// token -> user name
    pub api_tokens: HashMap<String, String>,
    pub static_dir: Option<PathBuf>,
    pub log_level: Level,
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parsed(&lookup, "SKYSHELF_LISTEN_ADDR", "0.0.0.0:8080".parse().ok())?;
        let daemon_url = lookup("SKYSHELF_DAEMON_URL").unwrap_or_else(|| DEFAULT_DAEMON_URL.to_string());

        let daemon_credentials = match (
            lookup("SKYSHELF_DAEMON_USER"),
            lookup("SKYSHELF_DAEMON_PASS"),
        ) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (Some(user), None) => Some((user, String::new())),
            _ => None,
        };

        let refresh_secs: u64 = parsed(&lookup, "SKYSHELF_REFRESH_INTERVAL_SECS", Some(300))?;
        let keepalive_secs: u64 = parsed(&lookup, "SKYSHELF_KEEPALIVE_SECS", Some(30))?;
        let probe_batch: usize = parsed(&lookup, "SKYSHELF_PROBE_BATCH", Some(5))?;

        if refresh_secs == 0 {
            return Err(invalid("SKYSHELF_REFRESH_INTERVAL_SECS", "0", "must be positive"));
        }
        if keepalive_secs == 0 {
            return Err(invalid("SKYSHELF_KEEPALIVE_SECS", "0", "must be positive"));
        }
        if probe_batch == 0 {
            return Err(invalid("SKYSHELF_PROBE_BATCH", "0", "must be positive"));
        }

        let api_tokens = lookup("SKYSHELF_API_TOKENS")
            .map(|raw| parse_tokens(&raw))
            .unwrap_or_default();

        let static_dir = lookup("SKYSHELF_STATIC_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let log_level = parsed(&lookup, "SKYSHELF_LOG_LEVEL", Some(Level::INFO))?;

        Ok(ControllerConfig {
            listen_addr,
            daemon_url,
            daemon_credentials,
            refresh_interval: Duration::from_secs(refresh_secs),
            keepalive: Duration::from_secs(keepalive_secs),
            probe_batch,
            api_tokens,
            static_dir,
            log_level,
        })
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            interval: self.refresh_interval,
            batch_size: self.probe_batch,
            ..SchedulerSettings::default()
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| invalid(var, &raw, e)),
        None => default.ok_or_else(|| invalid(var, "", "required")),
    }
}

/// `alice:tok1,bob:tok2`; a bare token belongs to user `api`.
fn parse_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| match item.split_once(':') {
            Some((user, token)) if !token.is_empty() => {
                Some((token.to_string(), user.trim().to_string()))
            }
            Some(_) => None,
            None => Some((item.to_string(), "api".to_string())),
        })
        .collect()
}
