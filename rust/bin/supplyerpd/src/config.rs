//! Server-side configuration.
//!
//! Reads `/etc/supplyerp/<name>.toml` (or an explicit path).

use std::path::{Path, PathBuf};

use analytics::service::AnalyticsConfig;
use serde::Deserialize;

/// Directory holding named server configs.
pub const CONFIG_DIR: &str = "/etc/supplyerp";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    pub storage: StorageConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Defaults to `{data_dir}/data.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: u64,
}

fn default_expire_secs() -> u64 {
    86400
}

impl ServerConfig {
    /// Resolve a context name or path to a config file.
    ///
    /// Anything containing `/` or ending in `.toml` is taken as a path;
    /// a bare name maps to `/etc/supplyerp/<name>.toml`.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.ends_with(".toml") {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(CONFIG_DIR).join(format!("{}.toml", name_or_path))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Listen address: CLI flag first, then `[server] listen`, then the default.
    pub fn listen_addr(&self, cli: Option<&str>, default: &str) -> String {
        cli.map(str::to_string)
            .or_else(|| self.server.listen.clone())
            .unwrap_or_else(|| default.to_string())
    }
}
