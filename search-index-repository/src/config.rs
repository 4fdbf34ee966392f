//! Configuration types for the index client.

use std::env;
use std::time::Duration;

use tracing::{error, info};
use url::Url;

use crate::errors::IndexError;

/// Port assumed for servers configured without one.
pub const DEFAULT_PORT: u16 = 9200;

const DEFAULT_CODEC: &str = "default";
const DEFAULT_NUMBER_OF_SHARDS: u32 = 1;
const DEFAULT_NUMBER_OF_REPLICAS: u32 = 1;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PIT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_PIT_PAGE_SIZE: usize = 100;

/// User sent when only a password is configured.
pub const DEFAULT_USERNAME: &str = "elastic";

/// When writes become visible to searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Every write refreshes the index before returning.
    Immediate,
    /// Writes become visible on the engine's periodic refresh.
    Deferred,
}

impl RefreshPolicy {
    /// Value of the `refresh` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Immediate => "true",
            Self::Deferred => "false",
        }
    }
}

/// Configuration for the index client.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Engine endpoints. Only the first one is used by the bundled transport.
    pub servers: Vec<Url>,
    /// Prepended to every index name.
    pub prefix: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// Largest `from + size` the index accepts.
    pub max_result_window: usize,
    /// Stored-fields codec; `"default"` leaves the engine default in place.
    pub codec: String,
    pub connect_timeout: Duration,
    pub socket_timeout: Duration,
    /// Use point-in-time pagination when the engine supports it.
    pub enable_pit: bool,
    pub pit_keep_alive: Duration,
    /// Size of the first page of a point-in-time read.
    pub pit_page_size: usize,
    pub refresh: RefreshPolicy,
    /// Basic-auth user; ignored without a password.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            prefix: String::new(),
            number_of_shards: DEFAULT_NUMBER_OF_SHARDS,
            number_of_replicas: DEFAULT_NUMBER_OF_REPLICAS,
            max_result_window: i32::MAX as usize,
            codec: DEFAULT_CODEC.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            enable_pit: false,
            pit_keep_alive: DEFAULT_PIT_KEEP_ALIVE,
            pit_page_size: DEFAULT_PIT_PAGE_SIZE,
            refresh: RefreshPolicy::Immediate,
            username: None,
            password: None,
        }
    }
}

impl ElasticConfig {
    /// Create a config for the given server URIs with all other values defaulted.
    ///
    /// Invalid URIs are logged and skipped. At least one must be valid.
    pub fn with_servers<S: AsRef<str>>(servers: &[S]) -> Result<Self, IndexError> {
        let config = Self {
            servers: parse_servers(servers),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ELASTICSEARCH_SERVER`: comma-separated server URIs (required)
    /// - `ELASTICSEARCH_PREFIX`: index name prefix (default: empty)
    /// - `ELASTICSEARCH_NUMBER_OF_SHARDS` (default: 1)
    /// - `ELASTICSEARCH_NUMBER_OF_REPLICAS` (default: 1)
    /// - `ELASTICSEARCH_MAX_RESULT_WINDOW` (default: 2147483647)
    /// - `ELASTICSEARCH_CODEC` (default: default)
    /// - `ELASTICSEARCH_CONNECT_TIMEOUT_MS` (default: 1000)
    /// - `ELASTICSEARCH_SOCKET_TIMEOUT_MS` (default: 30000)
    /// - `ELASTICSEARCH_ENABLE_PIT` (default: false)
    /// - `ELASTICSEARCH_PIT_KEEP_ALIVE_SECS` (default: 60)
    /// - `ELASTICSEARCH_PIT_PAGE_SIZE` (default: 100)
    /// - `ELASTICSEARCH_REFRESH`: `true` or `false` (default: true)
    /// - `ELASTICSEARCH_USERNAME`, `ELASTICSEARCH_PASSWORD`: basic-auth credentials; the user
    ///   defaults to `elastic` when only a password is set
    pub fn from_env() -> Result<Self, IndexError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexError> {
        let defaults = Self::default();
        let servers: Vec<String> = lookup("ELASTICSEARCH_SERVER")
            .map(|s| {
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            servers: parse_servers(&servers),
            prefix: lookup("ELASTICSEARCH_PREFIX").unwrap_or_default(),
            number_of_shards: parse_or(&lookup, "ELASTICSEARCH_NUMBER_OF_SHARDS", defaults.number_of_shards)?,
            number_of_replicas: parse_or(
                &lookup,
                "ELASTICSEARCH_NUMBER_OF_REPLICAS",
                defaults.number_of_replicas,
            )?,
            max_result_window: parse_or(
                &lookup,
                "ELASTICSEARCH_MAX_RESULT_WINDOW",
                defaults.max_result_window,
            )?,
            codec: lookup("ELASTICSEARCH_CODEC").unwrap_or(defaults.codec),
            connect_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ELASTICSEARCH_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )?),
            socket_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ELASTICSEARCH_SOCKET_TIMEOUT_MS",
                defaults.socket_timeout.as_millis() as u64,
            )?),
            enable_pit: parse_or(&lookup, "ELASTICSEARCH_ENABLE_PIT", defaults.enable_pit)?,
            pit_keep_alive: Duration::from_secs(parse_or(
                &lookup,
                "ELASTICSEARCH_PIT_KEEP_ALIVE_SECS",
                defaults.pit_keep_alive.as_secs(),
            )?),
            pit_page_size: parse_or(&lookup, "ELASTICSEARCH_PIT_PAGE_SIZE", defaults.pit_page_size)?,
            refresh: if parse_or(&lookup, "ELASTICSEARCH_REFRESH", true)? {
                RefreshPolicy::Immediate
            } else {
                RefreshPolicy::Deferred
            },
            username: lookup("ELASTICSEARCH_PASSWORD").map(|_| {
                lookup("ELASTICSEARCH_USERNAME")
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| DEFAULT_USERNAME.to_string())
            }),
            password: lookup("ELASTICSEARCH_PASSWORD"),
        };
        config.validate()?;

        info!(
            servers = ?config.servers.iter().map(Url::as_str).collect::<Vec<_>>(),
            prefix = %config.prefix,
            enable_pit = config.enable_pit,
            "Loaded Elasticsearch configuration"
        );
        Ok(config)
    }

    /// Check invariants the client relies on.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.servers.is_empty() {
            return Err(IndexError::config("No valid Elasticsearch servers configured"));
        }
        if self.pit_page_size == 0 {
            return Err(IndexError::config("PIT page size must be greater than zero"));
        }
        Ok(())
    }

    /// Enable point-in-time pagination with the given first page size.
    pub fn with_pit(mut self, page_size: usize) -> Self {
        self.enable_pit = true;
        self.pit_page_size = page_size;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    /// Basic-auth credentials, when a password is configured. The user
    /// defaults to [`DEFAULT_USERNAME`].
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let password = self.password.as_deref()?;
        let user = self.username.as_deref().unwrap_or(DEFAULT_USERNAME);
        Some((user, password))
    }

    /// Physical index name: `{prefix}{name}_{version:04}`.
    pub fn index_name(&self, name: &str, schema_version: u32) -> String {
        format!("{}{}_{:04}", self.prefix, name, schema_version)
    }

    /// Keep-alive in the engine's time-unit syntax, e.g. `60s`.
    pub fn pit_keep_alive_param(&self) -> String {
        format!("{}s", self.pit_keep_alive.as_secs())
    }
}

fn parse_servers<S: AsRef<str>>(servers: &[S]) -> Vec<Url> {
    servers
        .iter()
        .filter_map(|server| {
            let server = server.as_ref();
            match Url::parse(server) {
                Ok(mut url) if url.has_host() => {
                    if url.port().is_none() && url.set_port(Some(DEFAULT_PORT)).is_err() {
                        error!(server = %server, "Invalid server URI: cannot set port");
                        return None;
                    }
                    Some(url)
                }
                Ok(_) => {
                    error!(server = %server, "Invalid server URI: missing host");
                    None
                }
                Err(e) => {
                    error!(server = %server, error = %e, "Invalid server URI");
                    None
                }
            }
        })
        .collect()
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, IndexError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IndexError::config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(default),
    }
}
