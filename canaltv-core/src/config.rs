use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CanaltvConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    pub registry: RegistrySection,
    pub probe: ProbeSection,
    pub monitor: MonitorSection,
}

impl CanaltvConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn registry_db_path(&self) -> PathBuf {
        let candidate = Path::new(&self.registry.database);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            Path::new(&self.paths.data_dir).join(candidate)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySection {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSection {
    pub primary_timeout_seconds: u64,
    pub fallback_timeout_seconds: u64,
    pub max_body_bytes: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    pub recheck_hours: i64,
    pub sweep_interval_hours: u64,
    pub batch_size: usize,
    pub batch_pause_seconds: u64,
    pub failure_threshold: u32,
    pub warmup_seconds: u64,
}

pub fn load_canaltv_config<P: AsRef<Path>>(path: P) -> Result<CanaltvConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/canaltv.toml");
        let config = load_canaltv_config(path).expect("config should parse");
        assert_eq!(config.system.node_name, "canaltv-primary");
        assert_eq!(config.probe.primary_timeout_seconds, 8);
        assert_eq!(config.probe.fallback_timeout_seconds, 10);
        assert_eq!(config.monitor.batch_size, 5);
        assert_eq!(config.monitor.failure_threshold, 3);
    }

    #[test]
    fn registry_db_path_joins_data_dir() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/canaltv.toml");
        let config = load_canaltv_config(path).unwrap();
        assert_eq!(
            config.registry_db_path(),
            Path::new("/opt/canaltv/data/channels.sqlite")
        );
    }
}
