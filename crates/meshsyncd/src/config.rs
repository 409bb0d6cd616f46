//! meshsyncd.toml configuration parser.
//!
//! Every section is optional; an empty file yields a daemon listening on
//! `0.0.0.0:9000` with no scheduler, no certificates and no policies.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

use meshsync_backends::{DEFAULT_SSH_PORT, ReconcilerConfig};
use meshsync_mesh::{CertPair, PolicyEdge, TranslatorConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api: ApiConfig,
    pub scheduler: SchedulerConfig,
    pub snapshot: SnapshotConfig,
    pub certs: CertsConfig,
    pub policy: Vec<PolicyEdge>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Base URL of the scheduler; without one every backend set stays empty.
    pub url: Option<String>,
    #[serde(deserialize_with = "duration_str")]
    pub reconcile_interval: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub retry_delay: Duration,
    #[serde(deserialize_with = "duration_str")]
    pub request_timeout: Duration,
    pub channel_capacity: usize,
    pub ssh_port: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconcile_interval: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
            channel_capacity: 1024,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }
}

impl SchedulerConfig {
    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            reconcile_interval: self.reconcile_interval,
            retry_delay: self.retry_delay,
            channel_capacity: self.channel_capacity,
            ssh_port: self.ssh_port,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    #[serde(deserialize_with = "duration_str")]
    pub interval: Duration,
    pub node_id: String,
    pub gateway_name: String,
    pub gateway_port: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        let translator = TranslatorConfig::default();
        Self {
            interval: Duration::from_secs(5),
            node_id: meshsync_snapshot::DEFAULT_NODE_ID.to_string(),
            gateway_name: translator.gateway_name,
            gateway_port: translator.gateway_port,
        }
    }
}

impl SnapshotConfig {
    pub fn translator(&self) -> TranslatorConfig {
        TranslatorConfig {
            gateway_name: self.gateway_name.clone(),
            gateway_port: self.gateway_port,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertsConfig {
    /// Root of `<dir>/<hostname>/tls.crt` + `tls.key` pairs.
    pub dir: Option<PathBuf>,
    pub pair: Vec<CertPair>,
}

impl Config {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.reconcile_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "scheduler.reconcile_interval must be positive".into(),
            ));
        }
        if self.scheduler.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.channel_capacity must be positive".into(),
            ));
        }
        if self.snapshot.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "snapshot.interval must be positive".into(),
            ));
        }
        if self.snapshot.node_id.is_empty() || self.snapshot.gateway_name.is_empty() {
            return Err(ConfigError::Invalid(
                "snapshot.node_id and snapshot.gateway_name are required".into(),
            ));
        }
        if let Some(pair) = self.certs.pair.iter().find(|p| p.hosts.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "certificate pair {} lists no hosts",
                pair.cert_path
            )));
        }
        if self
            .policy
            .iter()
            .any(|edge| edge.source.is_empty() || edge.destination.is_empty())
        {
            return Err(ConfigError::Invalid(
                "policy edges need a source and a destination".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn duration_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration {s:?}")))
}
