use crate::compile::CommandCompiler;
use crate::proc::Limits;
use crossbuild_common::api;
use crossbuild_common::config::{ConfigFile, FetchMode};
use crossbuild_common::errors::*;
use crossbuild_common::target::Target;
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Everything the build pipeline needs, resolved from the config file and
/// checked for consistency.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub import_path: String,
    pub workspace: PathBuf,
    pub fetch: FetchMode,
    pub archive_url: Option<String>,
    pub clone_url: Option<String>,
    pub branches: Vec<String>,
    pub targets: Vec<Target>,
    pub resources: Vec<String>,
    pub archive_path: PathBuf,
    pub compiler: CommandCompiler,
    pub tags: HashMap<String, Vec<String>>,
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        let cwd = env::current_dir().context("Failed to determine current directory")?;
        Ok(cwd.join(path))
    }
}

impl Settings {
    pub fn from_config(config: &ConfigFile) -> Result<Settings> {
        let import_path = config
            .repository
            .import_path
            .clone()
            .filter(|p| !p.trim_matches('/').is_empty())
            .ok_or_else(|| format_err!("repository.import_path is not configured"))?;

        if config.targets.is_empty() {
            bail!("No targets configured");
        }

        // branch names end up in archive names the same way pushed refs do
        for branch in &config.branches {
            let normalized = api::normalize_ref(branch)
                .with_context(|| anyhow!("Invalid branch in config: {:?}", branch))?;
            if normalized != *branch {
                bail!("Branch must be given as a plain name, eg. {:?}: {:?}", normalized, branch);
            }
        }

        let fetch = config.fetch.mode();
        match fetch {
            FetchMode::Archive if config.repository.archive_url.is_none() => {
                bail!("repository.archive_url is required in archive fetch mode")
            }
            FetchMode::Checkout if config.repository.clone_url.is_none() => {
                bail!("repository.clone_url is required in checkout fetch mode")
            }
            _ => (),
        }

        let compiler = CommandCompiler::from_config(&config.build)?;

        Ok(Settings {
            import_path,
            // GOPATH must not be relative
            workspace: absolute(config.build.workspace())?,
            fetch,
            archive_url: config.repository.archive_url.clone(),
            clone_url: config.repository.clone_url.clone(),
            branches: config.branches.clone(),
            targets: config.targets.clone(),
            resources: config.resources.clone(),
            archive_path: absolute(config.archive_path())?,
            compiler,
            tags: config.tags.clone(),
        })
    }

    pub fn limits(&self) -> Limits {
        self.compiler.limits
    }
}
