use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlx connection url, e.g. `sqlite://database/catalog.db`
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// directory for daily rotated log files, stdout if unset
    pub log_dir: Option<std::path::PathBuf>,
    pub request_timeout_secs: u64,
    /// how many per-student lecture locks to keep around
    pub progress_lock_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://database/catalog.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_dir: None,
            request_timeout_secs: 30,
            progress_lock_capacity: 10_000,
        }
    }
}

impl Config {
    /// Read a TOML config file, missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config = toml::from_str::<Config>(&content)?;
        Ok(config)
    }

    /// `DATABASE_URL` from the environment or a `.env` file wins over the file value.
    pub fn with_env(mut self) -> Self {
        let _ = dotenvy::dotenv();
        if let Ok(url) = dotenvy::var("DATABASE_URL") {
            self.database_url = url;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
