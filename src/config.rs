//! Configuration loading and management.

use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level node configuration, parsed from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node identity and listener settings.
    pub server: ServerConfig,
    /// Persistence (repository) settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Write-behind persistence queue tuning.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Connection-level timing and size limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Cross-node bus settings.
    #[serde(default)]
    pub bus: BusConfig,
    /// Prometheus metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Node identity and socket listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Stable id for this node, used to tag outbound bus envelopes and to
    /// drop self-echoed inbound ones. Empty string means "generate one at
    /// startup" (ADD, not in spec.md's option set verbatim, but §6.5 allows
    /// `server_id: string-or-empty`).
    #[serde(default)]
    pub server_id: String,
    /// Address the WebSocket gateway binds to.
    pub listen: SocketAddr,
    /// Optional TLS listener configuration.
    pub tls: Option<TlsConfig>,
    /// Log output format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// HMAC key for the default [`crate::auth::HmacTokenVerifier`]. Not part
    /// of the recognized option set proper -- an ambient requirement of
    /// shipping a working default verifier rather than a bare interface.
    pub token_secret: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert_path: String,
    /// Path to the PEM private key.
    pub key_path: String,
}

/// Persistence backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "pulsehub.db".to_string()
}

/// Write-behind persistence queue tuning (§6.5, §4.9).
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Number of worker tasks draining the persistence queue. `-1` (or
    /// omitted) means the default of 10.
    #[serde(default = "default_db_workers")]
    pub db_workers: i64,
    /// Batch size before a forced flush.
    #[serde(default = "default_insert_cache_limit")]
    pub insert_cache_limit: usize,
    /// Maximum time a partial batch waits before a forced flush, in seconds.
    #[serde(default = "default_insert_cache_timeout_secs")]
    pub insert_cache_timeout_secs: u64,
    /// Bounded channel capacity between producers and workers.
    #[serde(default = "default_cache_queue_size")]
    pub cache_queue_size: usize,
    /// If true, bypass batching and write one event per worker iteration.
    /// Operators who need stronger durability set this instead of a batch
    /// limit of 1, matching the design note's recommendation.
    #[serde(default)]
    pub single_insert_mode: bool,
}

impl PersistenceConfig {
    /// Effective worker count, resolving the `-1` sentinel to the default.
    pub fn resolved_db_workers(&self) -> usize {
        if self.db_workers < 0 {
            10
        } else {
            self.db_workers as usize
        }
    }

    /// Batch flush timeout as a [`Duration`].
    pub fn insert_cache_timeout(&self) -> Duration {
        Duration::from_secs(self.insert_cache_timeout_secs)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_workers: default_db_workers(),
            insert_cache_limit: default_insert_cache_limit(),
            insert_cache_timeout_secs: default_insert_cache_timeout_secs(),
            cache_queue_size: default_cache_queue_size(),
            single_insert_mode: false,
        }
    }
}

fn default_db_workers() -> i64 {
    -1
}
fn default_insert_cache_limit() -> usize {
    70
}
fn default_insert_cache_timeout_secs() -> u64 {
    5
}
fn default_cache_queue_size() -> usize {
    50
}

/// Connection-level timing and size limits (§6.5).
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Seconds of zero subscribers before a HubChannel self-destructs.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// Seconds a presence-offline transition is debounced.
    #[serde(default = "default_presence_debounce_secs")]
    pub presence_debounce_secs: u64,
    /// Seconds a heartbeat timestamp remains valid in the presence tracker.
    #[serde(default = "default_heartbeat_ttl_secs")]
    pub heartbeat_ttl_secs: u64,
    /// Seconds the write loop waits for a pong before closing.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    /// Seconds of outbound inactivity before the write loop sends a ping.
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,
    /// Maximum accepted inbound frame size, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Capacity of each session's bounded outbound send queue.
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl LimitsConfig {
    /// Inactivity timeout as a [`Duration`].
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    /// Presence debounce window as a [`Duration`].
    pub fn presence_debounce(&self) -> Duration {
        Duration::from_secs(self.presence_debounce_secs)
    }

    /// Heartbeat TTL as a [`Duration`].
    pub fn heartbeat_ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl_secs)
    }

    /// Pong wait as a [`Duration`].
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Ping period as a [`Duration`].
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            presence_debounce_secs: default_presence_debounce_secs(),
            heartbeat_ttl_secs: default_heartbeat_ttl_secs(),
            pong_wait_secs: default_pong_wait_secs(),
            ping_period_secs: default_ping_period_secs(),
            max_message_size: default_max_message_size(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

fn default_inactivity_timeout_secs() -> u64 {
    15 * 60
}
fn default_presence_debounce_secs() -> u64 {
    15
}
fn default_heartbeat_ttl_secs() -> u64 {
    3 * 60
}
fn default_pong_wait_secs() -> u64 {
    60
}
fn default_ping_period_secs() -> u64 {
    54
}
fn default_max_message_size() -> usize {
    64 * 1024
}
fn default_send_queue_capacity() -> usize {
    10
}

/// Cross-node bus adapter settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BusConfig {
    /// Peer node addresses to connect to at startup. Empty means
    /// single-node/in-process mode (`LocalBus`).
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Prometheus metrics endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Port to serve `/metrics` on. `0` disables the endpoint.
    #[serde(default)]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 0 }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants that `serde` alone cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.persistence.insert_cache_limit == 0 {
            return Err(ConfigError::Invalid(
                "persistence.insert_cache_limit must be at least 1".into(),
            ));
        }
        if self.limits.send_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "limits.send_queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
