use crate::errors::*;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const QUEUE_SIZE: usize = 100;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3050";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3050";
pub const DEFAULT_WORKSPACE: &str = "gopath";
pub const DEFAULT_ARCHIVE_PATH: &str = "data/archive";
pub const DEFAULT_DATABASE_PATH: &str = "data/crossbuild.db";
pub const DEFAULT_BUILD_TIMEOUT: u64 = 3600;
pub const DEFAULT_MAX_BYTES: usize = 4 * 1024 * 1024;

pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();

    if let Some(c) = load_from("/etc/crossbuild.conf")? {
        config.update(c);
    }

    if let Ok(path) = config_path() {
        if let Some(c) = load_from(path)? {
            config.update(c);
        }
    }

    if let Some(path) = path {
        let c = load_from(path)?.ok_or_else(|| format_err!("Failed to read config file"))?;
        config.update(c);
    }

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    let config_dir =
        dirs_next::config_dir().ok_or_else(|| format_err!("Failed to find config dir"))?;
    Ok(config_dir.join("crossbuild.conf"))
}

fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<ConfigFile>> {
    if let Ok(buf) = fs::read_to_string(path.as_ref()) {
        debug!("loading config file {:?}", path.as_ref());
        let config = toml::from_str(&buf)
            .with_context(|| anyhow!("Failed to load config: {:?}", path.as_ref()))?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub archive_path: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub build: BuildConfig,
    /// Build tags, keyed by target os
    #[serde(default)]
    pub tags: HashMap<String, Vec<String>>,
}

impl ConfigFile {
    pub fn update(&mut self, c: ConfigFile) {
        if !c.branches.is_empty() {
            self.branches = c.branches;
        }
        if !c.targets.is_empty() {
            self.targets = c.targets;
        }
        if !c.resources.is_empty() {
            self.resources = c.resources;
        }
        if c.archive_path.is_some() {
            self.archive_path = c.archive_path;
        }
        if c.database_path.is_some() {
            self.database_path = c.database_path;
        }
        self.http.update(c.http);
        self.webhook.update(c.webhook);
        self.repository.update(c.repository);
        self.fetch.update(c.fetch);
        self.build.update(c.build);
        self.tags.extend(c.tags);
    }

    pub fn archive_path(&self) -> PathBuf {
        self.archive_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_PATH))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: Option<String>,
    pub endpoint: Option<String>,
}

impl HttpConfig {
    pub fn update(&mut self, c: HttpConfig) {
        if c.bind_addr.is_some() {
            self.bind_addr = c.bind_addr;
        }
        if c.endpoint.is_some() {
            self.endpoint = c.endpoint;
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMode {
    /// Also accept `GET /hook?ref=...`
    #[default]
    Test,
    Github,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub mode: Option<WebhookMode>,
}

impl WebhookConfig {
    pub fn update(&mut self, c: WebhookConfig) {
        if c.mode.is_some() {
            self.mode = c.mode;
        }
    }

    pub fn mode(&self) -> WebhookMode {
        self.mode.unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub import_path: Option<String>,
    /// Source snapshot url, `{ref}` is replaced with the reference to build
    pub archive_url: Option<String>,
    pub clone_url: Option<String>,
}

impl RepositoryConfig {
    pub fn update(&mut self, c: RepositoryConfig) {
        if c.import_path.is_some() {
            self.import_path = c.import_path;
        }
        if c.archive_url.is_some() {
            self.archive_url = c.archive_url;
        }
        if c.clone_url.is_some() {
            self.clone_url = c.clone_url;
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Archive,
    Checkout,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub mode: Option<FetchMode>,
}

impl FetchConfig {
    pub fn update(&mut self, c: FetchConfig) {
        if c.mode.is_some() {
            self.mode = c.mode;
        }
    }

    pub fn mode(&self) -> FetchMode {
        self.mode.unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub workspace: Option<PathBuf>,
    /// Seconds per subprocess, 0 disables the timeout
    pub timeout: Option<u64>,
    pub max_bytes: Option<usize>,
    pub deps_cmd: Option<Vec<String>>,
    pub build_cmd: Option<Vec<String>>,
    pub tags_flag: Option<String>,
    pub root_env: Option<String>,
    pub os_env: Option<String>,
    pub arch_env: Option<String>,
    pub variant_env: Option<String>,
}

impl BuildConfig {
    pub fn update(&mut self, c: BuildConfig) {
        if c.workspace.is_some() {
            self.workspace = c.workspace;
        }
        if c.timeout.is_some() {
            self.timeout = c.timeout;
        }
        if c.max_bytes.is_some() {
            self.max_bytes = c.max_bytes;
        }
        if c.deps_cmd.is_some() {
            self.deps_cmd = c.deps_cmd;
        }
        if c.build_cmd.is_some() {
            self.build_cmd = c.build_cmd;
        }
        if c.tags_flag.is_some() {
            self.tags_flag = c.tags_flag;
        }
        if c.root_env.is_some() {
            self.root_env = c.root_env;
        }
        if c.os_env.is_some() {
            self.os_env = c.os_env;
        }
        if c.arch_env.is_some() {
            self.arch_env = c.arch_env;
        }
        if c.variant_env.is_some() {
            self.variant_env = c.variant_env;
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE))
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_BUILD_TIMEOUT)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes.unwrap_or(DEFAULT_MAX_BYTES)
    }

    pub fn deps_cmd(&self) -> Vec<String> {
        self.deps_cmd
            .clone()
            .unwrap_or_else(|| vec!["go".into(), "get".into(), "-v".into()])
    }

    pub fn build_cmd(&self) -> Vec<String> {
        self.build_cmd
            .clone()
            .unwrap_or_else(|| vec!["go".into(), "build".into(), "-v".into()])
    }

    pub fn tags_flag(&self) -> &str {
        self.tags_flag.as_deref().unwrap_or("-tags")
    }

    pub fn root_env(&self) -> &str {
        self.root_env.as_deref().unwrap_or("GOPATH")
    }

    pub fn os_env(&self) -> &str {
        self.os_env.as_deref().unwrap_or("GOOS")
    }

    pub fn arch_env(&self) -> &str {
        self.arch_env.as_deref().unwrap_or("GOARCH")
    }

    pub fn variant_env(&self) -> &str {
        self.variant_env.as_deref().unwrap_or("GOARM")
    }
}
