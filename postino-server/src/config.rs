use anyhow::{bail, Context};
use postino_core::Limits;
use std::{net::SocketAddr, str::FromStr, time::Duration};

/// What the dispatcher does when a recency cache push fails after the
/// message is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanoutPolicy {
    /// Report the failure to the caller (the message is still delivered).
    #[default]
    Strict,
    /// Log the failure and report success.
    BestEffort,
}

impl FromStr for FanoutPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FanoutPolicy::Strict),
            "best-effort" | "best_effort" => Ok(FanoutPolicy::BestEffort),
            other => bail!("unknown fan-out policy {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// `None` keeps the cache in process memory.
    pub url: Option<String>,
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            capacity: 20,
            ttl: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cache: CacheConfig,
    pub fanout: FanoutPolicy,
    pub limits: Limits,
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; unset keys fall
    /// back to their defaults, malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| "postino.db".to_string());
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("parse BIND_ADDR")?;

        let defaults = CacheConfig::default();
        let capacity = match lookup("CACHE_CAPACITY") {
            Some(v) => v.parse().context("parse CACHE_CAPACITY")?,
            None => defaults.capacity,
        };
        if capacity == 0 {
            bail!("CACHE_CAPACITY must be at least 1");
        }
        let ttl = match lookup("CACHE_TTL_SECS") {
            Some(v) => Duration::from_secs(v.parse().context("parse CACHE_TTL_SECS")?),
            None => defaults.ttl,
        };
        if ttl.is_zero() {
            bail!("CACHE_TTL_SECS must be at least 1");
        }
        let cache = CacheConfig {
            url: lookup("CACHE_URL").filter(|v| !v.trim().is_empty()),
            capacity,
            ttl,
        };

        let fanout = match lookup("FANOUT_POLICY") {
            Some(v) => v.parse().context("parse FANOUT_POLICY")?,
            None => FanoutPolicy::default(),
        };

        let mut limits = Limits::default();
        if let Some(v) = lookup("MAX_TEXT_LEN") {
            limits.max_text_len = v.parse().context("parse MAX_TEXT_LEN")?;
        }

        Ok(Self {
            database_url,
            bind_addr,
            cache,
            fanout,
            limits,
        })
    }
}
