//! Validated run configuration and the optional tunables file.
//!
//! The CLI layer constructs a [`StressConfig`] and calls
//! [`StressConfig::validate`] before any worker starts; the core never sees
//! unchecked parameters. [`Tunables`] is a small layered TOML file for knobs
//! that do not belong on the command line (grace period, payload size,
//! connect timeout), with compiled-in defaults and an environment variable
//! override for the file path.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StressError;

// ---------------------------------------------------------------------------
// Stressor kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StressorKind {
    Cpu,
    Ram,
    Network,
}

impl std::fmt::Display for StressorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StressorKind::Cpu => write!(f, "cpu"),
            StressorKind::Ram => write!(f, "ram"),
            StressorKind::Network => write!(f, "network"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CpuConfig {
    /// Number of worker threads; one per core to saturate.
    pub cores: usize,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RamConfig {
    /// Total memory to allocate, split across workers.
    pub size_mb: u64,
    pub threads: usize,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetMode {
    Server,
    Client,
}

impl FromStr for NetMode {
    type Err = StressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(NetMode::Server),
            "client" => Ok(NetMode::Client),
            other => Err(StressError::Config(format!(
                "invalid network mode '{}' (expected 'server' or 'client')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    pub mode: NetMode,
    pub host: String,
    pub port: u16,
    /// Connection workers; client mode only.
    pub clients: usize,
    pub duration_secs: u64,
}

/// Immutable input for one stress run, tagged by stressor kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StressConfig {
    Cpu(CpuConfig),
    Ram(RamConfig),
    Network(NetworkConfig),
}

impl StressConfig {
    pub fn kind(&self) -> StressorKind {
        match self {
            StressConfig::Cpu(_) => StressorKind::Cpu,
            StressConfig::Ram(_) => StressorKind::Ram,
            StressConfig::Network(_) => StressorKind::Network,
        }
    }

    pub fn duration(&self) -> Duration {
        let secs = match self {
            StressConfig::Cpu(c) => c.duration_secs,
            StressConfig::Ram(c) => c.duration_secs,
            StressConfig::Network(c) => c.duration_secs,
        };
        Duration::from_secs(secs)
    }

    /// Check the run parameters. Any violation is fatal: the run never starts.
    pub fn validate(&self) -> Result<(), StressError> {
        if self.duration().is_zero() {
            return Err(StressError::Config("duration must be at least 1 second".into()));
        }
        match self {
            StressConfig::Cpu(c) => {
                if c.cores == 0 {
                    return Err(StressError::Config("cores must be at least 1".into()));
                }
            }
            StressConfig::Ram(c) => {
                if c.size_mb == 0 {
                    return Err(StressError::Config("size must be at least 1 MB".into()));
                }
                if c.threads == 0 {
                    return Err(StressError::Config("threads must be at least 1".into()));
                }
            }
            StressConfig::Network(c) => {
                if c.host.is_empty() {
                    return Err(StressError::Config("host must not be empty".into()));
                }
                if c.port == 0 {
                    return Err(StressError::Config("port must be in 1-65535".into()));
                }
                if c.mode == NetMode::Client && c.clients == 0 {
                    return Err(StressError::Config("clients must be at least 1".into()));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tunables file
// ---------------------------------------------------------------------------

/// Runtime knobs loaded from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// How long to wait for workers to drain after a deadline or interrupt
    /// before force-closing them.
    pub grace_period_secs: u64,
    /// Client payload size per send.
    pub payload_kib: usize,
    /// Connect timeout for client workers.
    pub connect_timeout_secs: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            grace_period_secs: 2,
            payload_kib: 64,
            connect_timeout_secs: 5,
        }
    }
}

impl Tunables {
    /// Load tunables from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tunables file: {}", path.display()))?;
        let tunables: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse tunables file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded tunables");
        Ok(tunables)
    }

    /// Try to load tunables from, in order:
    /// 1. The path in the `STRESSKIT_CONFIG` environment variable.
    /// 2. `./stresskit.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("STRESSKIT_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(t) => return t,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "STRESSKIT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new("stresskit.toml");
        if local.exists() {
            match Self::load(local) {
                Ok(t) => return t,
                Err(e) => {
                    warn!(error = %e, "stresskit.toml present but unusable, using defaults");
                }
            }
        }

        Self::default()
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn payload_len(&self) -> usize {
        self.payload_kib * 1024
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(cores: usize, duration_secs: u64) -> StressConfig {
        StressConfig::Cpu(CpuConfig {
            cores,
            duration_secs,
        })
    }

    #[test]
    fn test_valid_configs_pass() {
        assert!(cpu(1, 1).validate().is_ok());
        assert!(StressConfig::Ram(RamConfig {
            size_mb: 1024,
            threads: 4,
            duration_secs: 60,
        })
        .validate()
        .is_ok());
        assert!(StressConfig::Network(NetworkConfig {
            mode: NetMode::Server,
            host: "127.0.0.1".into(),
            port: 9999,
            clients: 0, // ignored in server mode
            duration_secs: 60,
        })
        .validate()
        .is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(matches!(
            cpu(4, 0).validate(),
            Err(StressError::Config(_))
        ));
    }

    #[test]
    fn test_zero_cores_rejected() {
        assert!(cpu(0, 10).validate().is_err());
    }

    #[test]
    fn test_network_client_needs_workers() {
        let cfg = StressConfig::Network(NetworkConfig {
            mode: NetMode::Client,
            host: "127.0.0.1".into(),
            port: 9999,
            clients: 0,
            duration_secs: 10,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_port_zero_rejected() {
        let cfg = StressConfig::Network(NetworkConfig {
            mode: NetMode::Server,
            host: "0.0.0.0".into(),
            port: 0,
            clients: 1,
            duration_secs: 10,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_net_mode_parsing() {
        assert_eq!("server".parse::<NetMode>().unwrap(), NetMode::Server);
        assert_eq!("client".parse::<NetMode>().unwrap(), NetMode::Client);
        assert!("proxy".parse::<NetMode>().is_err());
    }

    #[test]
    fn test_tunables_defaults() {
        let t = Tunables::default();
        assert_eq!(t.grace_period(), Duration::from_secs(2));
        assert_eq!(t.payload_len(), 64 * 1024);
        assert_eq!(t.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_tunables_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stresskit.toml");
        std::fs::write(&path, "grace_period_secs = 5\npayload_kib = 16\n").unwrap();
        let t = Tunables::load(&path).unwrap();
        assert_eq!(t.grace_period_secs, 5);
        assert_eq!(t.payload_kib, 16);
        // Unspecified fields keep their defaults.
        assert_eq!(t.connect_timeout_secs, 5);
    }

    #[test]
    fn test_tunables_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stresskit.toml");
        std::fs::write(&path, "grace_period_secs = \"soon\"").unwrap();
        assert!(Tunables::load(&path).is_err());
    }
}
