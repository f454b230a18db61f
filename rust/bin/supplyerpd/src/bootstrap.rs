//! Bootstrap: configuration checks run before any storage is opened.

use crate::config::ServerConfig;

/// The well-known role that bypasses every permission check.
pub const ROOT_ROLE_ID: &str = "policy:root";

/// Verify the server configuration is usable.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.jwt.secret.trim().is_empty() {
        anyhow::bail!("JWT secret is empty in configuration.");
    }
    if config.storage.data_dir.trim().is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.analytics.top_n == 0 {
        anyhow::bail!("analytics.top_n must be at least 1.");
    }
    Ok(())
}
