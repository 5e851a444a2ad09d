use crossbuild_common::config::{self, ConfigFile, WebhookMode, DEFAULT_BIND_ADDR};
use crossbuild_common::errors::*;
use crossbuild_worker::config::Settings;
use std::env;
use std::path::{Path, PathBuf};

/// Keeps events in memory instead of sqlite.
pub const MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub webhook: WebhookMode,
    pub database_path: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn in_memory(&self) -> bool {
        self.database_path == Path::new(MEMORY_DATABASE)
    }
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = config::load(path)?;
    from_struct(config)
}

pub fn from_struct(config: ConfigFile) -> Result<Config> {
    let bind_addr = if let Ok(addr) = env::var("HTTP_ADDR") {
        addr
    } else if let Some(addr) = &config.http.bind_addr {
        addr.clone()
    } else {
        DEFAULT_BIND_ADDR.to_string()
    };

    let settings = Settings::from_config(&config).context("Invalid build configuration")?;

    Ok(Config {
        bind_addr,
        webhook: config.webhook.mode(),
        database_path: config.database_path(),
        settings,
    })
}
