//! Mode-specific configuration records.
//!
//! Records are built once by the resolver and handed by value to an engine
//! constructor. Secrets (`auth`, the key seed) are skipped when serializing so
//! a resolved record can be logged.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::headers::HeaderMap;

/// Default keep-alive interval for both modes.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(25);

/// Default listen address for the server.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port for the server.
pub const DEFAULT_PORT: &str = "8080";

fn default_keepalive() -> Duration {
    DEFAULT_KEEPALIVE
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_max_retry_count() -> i32 {
    -1
}

/// Server mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port, kept as given until the engine binds.
    #[serde(default = "default_port")]
    pub port: String,

    /// Deprecated key seed.
    #[serde(default, skip_serializing)]
    pub key_seed: String,

    /// Path to the private key file.
    #[serde(default)]
    pub key_file: String,

    /// Path to the users file.
    #[serde(default)]
    pub auth_file: String,

    /// `user:pass` credential.
    #[serde(default, skip_serializing)]
    pub auth: String,

    /// Keep-alive interval.
    #[serde(default = "default_keepalive", with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Reverse proxy target for plain HTTP requests.
    #[serde(default)]
    pub proxy: String,

    /// Allow clients to use the internal SOCKS5 proxy.
    #[serde(default)]
    pub socks5: bool,

    /// Allow clients to open reverse port forwards.
    #[serde(default)]
    pub reverse: bool,

    /// TLS settings.
    #[serde(default)]
    pub tls: ServerTlsConfig,

    /// Verbose engine logging.
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            key_seed: String::new(),
            key_file: String::new(),
            auth_file: String::new(),
            auth: String::new(),
            keep_alive: DEFAULT_KEEPALIVE,
            proxy: String::new(),
            socks5: false,
            reverse: false,
            tls: ServerTlsConfig::default(),
            debug: false,
        }
    }
}

/// Where the server takes its key material from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource<'a> {
    /// A PEM key file on disk.
    File(&'a str),
    /// The deprecated seed string.
    Seed(&'a str),
    /// Fresh random material on every start.
    Ephemeral,
}

impl ServerConfig {
    /// Returns the key source in effect. A key file wins over a seed.
    #[must_use]
    pub fn key_source(&self) -> KeySource<'_> {
        if !self.key_file.is_empty() {
            KeySource::File(&self.key_file)
        } else if !self.key_seed.is_empty() {
            KeySource::Seed(&self.key_seed)
        } else {
            KeySource::Ephemeral
        }
    }

    /// Returns `host:port` for binding.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Server TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerTlsConfig {
    /// Certificate path.
    #[serde(default)]
    pub cert: String,
    /// Private key path.
    #[serde(default)]
    pub key: String,
    /// Domains accepted for automatic certificates.
    #[serde(default)]
    pub domains: Vec<String>,
    /// CA bundle used to verify client certificates.
    #[serde(default)]
    pub ca: String,
}

/// Client mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server URL or `host:port`.
    pub server: String,

    /// Remote specifications, in command-line order.
    pub remotes: Vec<String>,

    /// Expected server key fingerprint.
    #[serde(default)]
    pub fingerprint: String,

    /// `user:pass` credential.
    #[serde(default, skip_serializing)]
    pub auth: String,

    /// Keep-alive interval.
    #[serde(default = "default_keepalive", with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Maximum connection attempts; negative means unlimited.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: i32,

    /// Upper bound for the reconnect delay; zero selects the engine default.
    #[serde(default, with = "humantime_serde")]
    pub max_retry_interval: Duration,

    /// Upstream HTTP CONNECT or SOCKS proxy.
    #[serde(default)]
    pub proxy: String,

    /// TLS settings.
    #[serde(default)]
    pub tls: ClientTlsConfig,

    /// Headers sent with the connection request. Only the names are
    /// serialized, values may carry credentials.
    #[serde(default, serialize_with = "serialize_header_names")]
    pub headers: HeaderMap,

    /// Verbose engine logging.
    #[serde(default)]
    pub debug: bool,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the targets.
    #[must_use]
    pub fn new(server: impl Into<String>, remotes: Vec<String>) -> Self {
        Self {
            server: server.into(),
            remotes,
            fingerprint: String::new(),
            auth: String::new(),
            keep_alive: DEFAULT_KEEPALIVE,
            max_retry_count: default_max_retry_count(),
            max_retry_interval: Duration::ZERO,
            proxy: String::new(),
            tls: ClientTlsConfig::default(),
            headers: HeaderMap::new(),
            debug: false,
        }
    }

    /// Returns the retry limit, or `None` when unlimited.
    #[must_use]
    pub fn retry_limit(&self) -> Option<u32> {
        u32::try_from(self.max_retry_count).ok()
    }
}

/// Client TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientTlsConfig {
    /// CA bundle used to verify the server.
    #[serde(default)]
    pub ca: String,
    /// Skip server certificate verification.
    #[serde(default)]
    pub skip_verify: bool,
    /// Client certificate path.
    #[serde(default)]
    pub cert: String,
    /// Client private key path.
    #[serde(default)]
    pub key: String,
    /// SNI override.
    #[serde(default)]
    pub server_name: String,
}

fn serialize_header_names<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(headers.iter().map(|(name, _)| name))
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a human-readable string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserializes a duration from a human-readable string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
