use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_ACTOR: &str = "system";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TagledgerConfig {
    pub database: Option<String>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    /// Actor recorded when a request carries no identity
    pub default_actor: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl TagledgerConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database.as_deref().map(PathBuf::from).unwrap_or_else(default_database_path)
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn default_actor(&self) -> &str {
        self.default_actor.as_deref().unwrap_or(DEFAULT_ACTOR)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Config written by `tagledger init`
    pub fn starter() -> Self {
        Self {
            database: Some(default_database_path().display().to_string()),
            bind: Some(DEFAULT_BIND.to_string()),
            port: Some(DEFAULT_PORT),
            default_actor: Some(DEFAULT_ACTOR.to_string()),
            busy_timeout_ms: Some(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("tagledger.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("tagledger.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<TagledgerConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: TagledgerConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &TagledgerConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
