//! replica-reload Configuration
//!
//! Typed configuration for the replica set, the optional fabric coordinator,
//! the upstream dataset service and the retry policy. Everything is checked
//! once at load time so the rest of the crate never probes for missing keys.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::replica::{FabricGroupDescriptor, ReplicaMember, ReplicaRegistry};
use crate::reload::RetryPolicy;

/// Main replica-reload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Replica set connection configuration
    pub database: DatabaseConfig,

    /// Fabric coordinator (optional)
    #[serde(default)]
    pub fabric: FabricConfig,

    /// Upstream dataset service
    pub upstream: UpstreamConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Reload behaviour
    #[serde(default)]
    pub reload: ReloadSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Replica set connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Candidate members, probed in this order
    #[serde(default)]
    pub members: Vec<MemberEntry>,

    /// Default port for members that do not carry one
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Schema holding the reload tables
    #[serde(default)]
    pub name: Option<String>,

    /// Connection pool size for the leader pool
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// A replica member as written in the configuration file.
///
/// Both `"db01.example.net|primary-east"` and
/// `{ host = "db01.example.net", name = "primary-east" }` are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberEntry {
    Legacy(String),
    Detailed {
        host: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl MemberEntry {
    /// Convert into a registry member
    pub fn to_member(&self) -> ReplicaMember {
        match self {
            MemberEntry::Legacy(entry) => ReplicaMember::parse(entry),
            MemberEntry::Detailed { host, name } => {
                ReplicaMember::new(host.trim(), name.as_deref().unwrap_or(host).trim())
            }
        }
    }
}

/// Fabric coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Delegate leader discovery to the coordinator
    #[serde(default)]
    pub enabled: bool,

    /// Coordinator host
    #[serde(default)]
    pub server: String,

    /// Coordinator MySQL-protocol port
    #[serde(default = "default_fabric_port")]
    pub port: u16,

    /// Coordinator user
    #[serde(default)]
    pub user: String,

    /// Coordinator password
    #[serde(default)]
    pub password: String,

    /// Coordinator schema
    #[serde(default = "default_fabric_database")]
    pub database: String,

    /// High-availability group holding the reload tables
    #[serde(default)]
    pub group_id: String,
}

/// Upstream dataset service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Short name of the source, used in archive file names
    #[serde(default = "default_source_name")]
    pub source_name: String,

    /// Service host
    pub host: String,

    /// Service port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Leading path segment
    #[serde(default)]
    pub path: String,

    /// Network segment of the report path
    #[serde(default)]
    pub network: String,

    /// API name segment of the report path
    #[serde(default)]
    pub api_name: String,

    /// Client name sent with each request
    #[serde(default)]
    pub client_name: String,

    /// Report type parameter
    #[serde(default = "default_report_type")]
    pub report_type: String,

    /// Address presented in the `auth` parameter
    #[serde(default)]
    pub auth_address: Option<String>,

    /// Basic auth user (optional)
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password (optional)
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total fetch-transform-write attempts per run
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Stop at the first dataset that fails validation
    #[serde(default)]
    pub fail_fast_on_invalid_rows: bool,
}

/// Reload behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadSettings {
    /// Directory receiving fetched payloads; unset disables archiving
    #[serde(default = "default_archive_dir")]
    pub archive_dir: Option<PathBuf>,

    /// Parse and validate only, never touch the database
    #[serde(default)]
    pub dry_run: bool,

    /// Rows per INSERT statement inside the reload transaction
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_db_port() -> u16 {
    3306
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_fabric_port() -> u16 {
    32275
}

fn default_fabric_database() -> String {
    "fabric".to_string()
}

fn default_source_name() -> String {
    "netdb".to_string()
}

fn default_http_port() -> u16 {
    80
}

fn default_report_type() -> String {
    "csv".to_string()
}

fn default_http_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_wait_ms() -> u64 {
    30_000
}

fn default_archive_dir() -> Option<PathBuf> {
    Some(PathBuf::from("/var/lib/replica-reload/archive"))
}

fn default_insert_batch_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            port: default_fabric_port(),
            user: String::new(),
            password: String::new(),
            database: default_fabric_database(),
            group_id: String::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            wait_ms: default_wait_ms(),
            fail_fast_on_invalid_rows: false,
        }
    }
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            dry_run: false,
            insert_batch_size: default_insert_batch_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ReloadConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: ReloadConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.fabric.enabled {
            if self.fabric.server.is_empty() {
                return Err(crate::Error::Config(
                    "fabric.server cannot be empty when fabric is enabled".into(),
                ));
            }
            if self.fabric.group_id.is_empty() {
                return Err(crate::Error::Config(
                    "fabric.group_id cannot be empty when fabric is enabled".into(),
                ));
            }
        } else if self.database.members.is_empty() {
            return Err(crate::Error::Config(
                "database.members needs at least one replica".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for member in self.registry().members() {
            if member.host_address.is_empty() {
                return Err(crate::Error::Config("database.members has an empty host".into()));
            }
            if !seen.insert(member.host_address.clone()) {
                return Err(crate::Error::Config(format!(
                    "database.members lists {} twice",
                    member.host_address
                )));
            }
        }

        if self.database.user.is_empty() {
            return Err(crate::Error::Config("database.user cannot be empty".into()));
        }

        if self.upstream.host.is_empty() {
            return Err(crate::Error::Config("upstream.host cannot be empty".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(crate::Error::Config("retry.max_attempts must be at least 1".into()));
        }

        if self.reload.insert_batch_size == 0 {
            return Err(crate::Error::Config(
                "reload.insert_batch_size must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Build the replica registry from the configured members
    pub fn registry(&self) -> ReplicaRegistry {
        let members = self.database.members.iter().map(MemberEntry::to_member).collect();
        let fabric = self.fabric.enabled.then(|| FabricGroupDescriptor {
            coordinator_address: self.fabric.server.clone(),
            group_id: self.fabric.group_id.clone(),
        });
        ReplicaRegistry::new(members, fabric)
    }

    /// Retry policy for the orchestrator
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            wait: Duration::from_millis(self.retry.wait_ms),
            fail_fast_on_invalid_rows: self.retry.fail_fast_on_invalid_rows,
        }
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connect_timeout_secs)
    }

    /// Commented sample written by `init`
    pub fn sample() -> &'static str {
        SAMPLE_CONFIG
    }
}

const SAMPLE_CONFIG: &str = r#"# replica-reload configuration

[database]
# Candidates in probe order, as "host|name" or { host = "...", name = "..." }
members = [
    "db01.example.net|primary-east",
    { host = "db02.example.net", name = "primary-west" },
]
port = 3306
user = "reloader"
password = "changeme"
name = "sdnctl"
pool_size = 5
connect_timeout_secs = 10

[fabric]
enabled = false
# server = "fabric.example.net"
# port = 32275
# user = "admin"
# password = "changeme"
# group_id = "sdnc-group"

[upstream]
source_name = "netdb"
host = "reports.example.net"
port = 80
path = "netdb"
network = "core"
api_name = "report"
client_name = "sdnc"
report_type = "csv"
# auth_address = "10.0.0.10"
timeout_secs = 60

[retry]
max_attempts = 5
wait_ms = 30000
fail_fast_on_invalid_rows = false

[reload]
archive_dir = "/var/lib/replica-reload/archive"
dry_run = false
insert_batch_size = 1000

[logging]
level = "info"
"#;
