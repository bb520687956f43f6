//! Bridge configuration – reads/writes `~/.roverlink/config.toml`.

use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use roverlink_middleware::Framing;
use roverlink_middleware::framing::DEFAULT_MAX_PAYLOAD_BYTES;
use roverlink_runtime::{BridgeConfig, DEFAULT_PORT, DispatchTimeouts};
use roverlink_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Which action client the bridge drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionBackend {
    /// A ROS 2 action server behind `rosbridge_server`.
    #[default]
    Rosbridge,
    /// The in-process simulated action server.
    Sim,
}

impl fmt::Display for ActionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionBackend::Rosbridge => write!(f, "rosbridge"),
            ActionBackend::Sim => write!(f, "sim"),
        }
    }
}

impl FromStr for ActionBackend {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rosbridge" => Ok(ActionBackend::Rosbridge),
            "sim" => Ok(ActionBackend::Sim),
            other => Err(BridgeError::Config(format!("unknown action backend '{other}'"))),
        }
    }
}

/// Persisted bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface the mission listener binds to.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// TCP port for mission traffic.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// `end_of_stream` (production) or `newline` (diagnostic).
    #[serde(default)]
    pub framing: Framing,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    #[serde(default)]
    pub action_backend: ActionBackend,

    /// WebSocket URL of the rover's `rosbridge_server`.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    #[serde(default = "default_action_name")]
    pub action_name: String,

    #[serde(default = "default_action_type")]
    pub action_type: String,

    /// Delay between action-server readiness probes.
    #[serde(default = "default_server_poll_interval_ms")]
    pub server_poll_interval_ms: u64,

    /// Give up waiting for the action server after this long. Unset waits
    /// forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_wait_timeout_secs: Option<u64>,

    /// Give up waiting for a goal result after this long. Unset waits
    /// forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_timeout_secs: Option<u64>,
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    DEFAULT_PORT
}
fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}
fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_action_name() -> String {
    "/mission".to_string()
}
fn default_action_type() -> String {
    "nav_autonomy_interface/action/Mission".to_string()
}
fn default_server_poll_interval_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            framing: Framing::default(),
            max_payload_bytes: default_max_payload_bytes(),
            action_backend: ActionBackend::default(),
            rosbridge_url: default_rosbridge_url(),
            action_name: default_action_name(),
            action_type: default_action_type(),
            server_poll_interval_ms: default_server_poll_interval_ms(),
            server_wait_timeout_secs: None,
            result_timeout_secs: None,
        }
    }
}

impl Config {
    /// Convert into the runtime settings consumed by the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if `listen_host` is not an IP address.
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, BridgeError> {
        let ip: IpAddr = self.listen_host.trim().parse().map_err(|e| {
            BridgeError::Config(format!("invalid listen_host '{}': {e}", self.listen_host))
        })?;
        Ok(BridgeConfig {
            listen_addr: SocketAddr::new(ip, self.listen_port),
            framing: self.framing,
            max_payload_bytes: self.max_payload_bytes,
            timeouts: DispatchTimeouts {
                server_wait: self.server_wait_timeout_secs.map(Duration::from_secs),
                result: self.result_timeout_secs.map(Duration::from_secs),
            },
        })
    }

    pub fn server_poll_interval(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }
}

/// Return the path to `~/.roverlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roverlink").join("config.toml")
}

/// Load the config from disk with `ROVERLINK_*` overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, BridgeError> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, BridgeError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Write `cfg` to `~/.roverlink/config.toml`, creating the directory.
pub fn save(cfg: &Config) -> Result<(), BridgeError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BridgeError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| BridgeError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        BridgeError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}

/// Apply `ROVERLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVERLINK_LISTEN_HOST` | `listen_host` |
/// | `ROVERLINK_LISTEN_PORT` | `listen_port` |
/// | `ROVERLINK_FRAMING` | `framing` |
/// | `ROVERLINK_ACTION_BACKEND` | `action_backend` |
/// | `ROVERLINK_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `ROVERLINK_ACTION_NAME` | `action_name` |
/// | `ROVERLINK_SERVER_WAIT_TIMEOUT_SECS` | `server_wait_timeout_secs` |
/// | `ROVERLINK_RESULT_TIMEOUT_SECS` | `result_timeout_secs` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ROVERLINK_LISTEN_HOST") {
        cfg.listen_host = v;
    }
    if let Some(port) = lookup("ROVERLINK_LISTEN_PORT").and_then(|v| v.parse().ok()) {
        cfg.listen_port = port;
    }
    if let Some(framing) = lookup("ROVERLINK_FRAMING").and_then(|v| v.parse().ok()) {
        cfg.framing = framing;
    }
    if let Some(backend) = lookup("ROVERLINK_ACTION_BACKEND").and_then(|v| v.parse().ok()) {
        cfg.action_backend = backend;
    }
    if let Some(v) = lookup("ROVERLINK_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
    if let Some(v) = lookup("ROVERLINK_ACTION_NAME") {
        cfg.action_name = v;
    }
    if let Some(secs) = lookup("ROVERLINK_SERVER_WAIT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        cfg.server_wait_timeout_secs = Some(secs);
    }
    if let Some(secs) = lookup("ROVERLINK_RESULT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        cfg.result_timeout_secs = Some(secs);
    }
}
