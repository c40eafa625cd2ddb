use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    path::Path,
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Register type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterType {
    /// Coil registers (read/write bits)
    Coils,
    /// Discrete input registers (read-only bits)
    DiscreteInputs,
    /// Holding registers (read/write words)
    Holding,
    /// Input registers (read-only words)
    Input,
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterType::Coils => write!(f, "coils"),
            RegisterType::DiscreteInputs => write!(f, "discrete_inputs"),
            RegisterType::Holding => write!(f, "holding"),
            RegisterType::Input => write!(f, "input"),
        }
    }
}

/// Root configuration structure for the simulator daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Slave simulator settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Poll monitors, one background task each
    #[serde(default, rename = "monitor")]
    pub monitors: Vec<MonitorConfig>,
}

impl SimulatorConfig {
    /// Load and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| anyhow!("Failed to read config {}: {err}", path.display()))?;
        let config = toml::from_str(&raw)
            .map_err(|err| anyhow!("Failed to parse config {}: {err}", path.display()))?;
        Ok(config)
    }
}

/// Slave simulator listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the Modbus TCP listener binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Register blocks written into storage before the listener starts
    #[serde(default, rename = "seed")]
    pub seeds: Vec<RegisterSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            seeds: Vec::new(),
        }
    }
}

/// Initial values for one contiguous register block
///
/// Bit tables (coils, discrete inputs) treat any non-zero value as ON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSeed {
    pub register: RegisterType,
    pub address: u16,
    pub values: Vec<u16>,
}

/// One polling task against a Modbus TCP device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Device host name or IP address
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Delay between poll rounds in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout for a single block read in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Skip republishing a block whose values did not change since the
    /// previous round
    #[serde(default)]
    pub publish_on_change_only: bool,
    /// Register blocks read on every poll round
    #[serde(default, rename = "block")]
    pub blocks: Vec<BlockConfig>,
}

impl MonitorConfig {
    /// Resolve the configured host and port to a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| anyhow!("Cannot resolve {}:{}: {err}", self.host, self.port))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}:{}", self.host, self.port))
    }
}

/// One contiguous register block to poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub register: RegisterType,
    pub address: u16,
    pub length: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0:5502".to_string()
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    3000
}
