use crate::compile::Compiler;
use crate::config::Settings;
use crate::fetch::{ArchiveFetcher, Fetcher, GitCheckout, Snapshot};
use crate::pack::Packager;
use crate::workspace::Workspace;
use crossbuild_common::config::FetchMode;
use crossbuild_common::errors::*;
use crossbuild_common::target::Target;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::task;

/// Fetch, compile and package one reference for every configured target.
pub struct Pipeline {
    workspace: Workspace,
    fetcher: Box<dyn Fetcher>,
    compiler: Box<dyn Compiler>,
    packager: Packager,
    targets: Vec<Target>,
    tags: HashMap<String, Vec<String>>,
}

impl Pipeline {
    pub fn new(
        workspace: Workspace,
        fetcher: Box<dyn Fetcher>,
        compiler: Box<dyn Compiler>,
        packager: Packager,
        targets: Vec<Target>,
        tags: HashMap<String, Vec<String>>,
    ) -> Pipeline {
        Pipeline {
            workspace,
            fetcher,
            compiler,
            packager,
            targets,
            tags,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Pipeline> {
        let workspace = Workspace::new(&settings.workspace, &settings.import_path)?;

        let fetcher: Box<dyn Fetcher> = match settings.fetch {
            FetchMode::Archive => {
                let url = settings
                    .archive_url
                    .clone()
                    .ok_or_else(|| format_err!("No archive url configured"))?;
                Box::new(ArchiveFetcher::new(url))
            }
            FetchMode::Checkout => {
                let url = settings
                    .clone_url
                    .clone()
                    .ok_or_else(|| format_err!("No clone url configured"))?;
                Box::new(GitCheckout::new(url, settings.limits()))
            }
        };
        let compiler: Box<dyn Compiler> = Box::new(settings.compiler.clone());
        let packager = Packager::new(&settings.archive_path, settings.resources.clone());

        Ok(Pipeline::new(
            workspace,
            fetcher,
            compiler,
            packager,
            settings.targets.clone(),
            settings.tags.clone(),
        ))
    }

    pub fn name(&self) -> &str {
        self.workspace.name()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn tags_for(&self, target: &Target) -> &[String] {
        self.tags
            .get(&target.os)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    async fn build_target(&self, snapshot: &Snapshot, target: &Target) -> Result<PathBuf, BuildError> {
        info!("Building {:?} for {}", snapshot.git_ref(), target);
        self.workspace.reset()?;

        let source = self.fetcher.fetch(&self.workspace, snapshot).await?;
        let binary = self
            .compiler
            .compile(&self.workspace, &source, target, self.tags_for(target))
            .await?;

        let packager = self.packager.clone();
        let name = self.name().to_string();
        let git_ref = snapshot.git_ref().to_string();
        let target = target.clone();
        task::spawn_blocking(move || packager.pack(&source, &binary, &name, &git_ref, &target))
            .await
            .or_build_err(BuildError::Package)?
    }

    async fn build_all(&self, git_ref: &str, archives: &mut Vec<PathBuf>) -> Result<(), BuildError> {
        self.workspace.reset()?;
        let snapshot = self.fetcher.pin(&self.workspace, git_ref).await?;
        debug!("Pinned {:?} to {:?}", git_ref, snapshot.pin());

        for target in &self.targets {
            let archive = self
                .build_target(&snapshot, target)
                .await
                .map_err(|err| err.within(target))?;
            archives.push(archive);
        }
        Ok(())
    }

    /// Resolves the reference once, then builds every target from that state
    /// in order and stops at the first failure. Archives of targets that
    /// finished before the failure are kept.
    pub async fn run(&self, git_ref: &str) -> Result<Vec<PathBuf>, BuildError> {
        let mut archives = Vec::with_capacity(self.targets.len());
        let res = self.build_all(git_ref, &mut archives).await;
        if let Err(err) = &res {
            error!("Build of {:?} failed: {:#}", git_ref, err);
        }

        if let Err(err) = self.workspace.reset() {
            warn!("Failed to clean up workspace: {:#}", err);
        }
        res.map(|_| archives)
    }
}
