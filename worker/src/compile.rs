use crate::proc::{self, Limits, Options};
use crate::workspace::Workspace;
use async_trait::async_trait;
use crossbuild_common::config::BuildConfig;
use crossbuild_common::errors::*;
use crossbuild_common::target::Target;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Produces one binary from a fetched source tree.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        workspace: &Workspace,
        source: &Path,
        target: &Target,
        tags: &[String],
    ) -> Result<PathBuf, BuildError>;
}

/// Runs the configured toolchain commands, `go get` followed by `go build`
/// unless configured otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandCompiler {
    pub deps_cmd: Vec<String>,
    pub build_cmd: Vec<String>,
    pub tags_flag: String,
    pub root_env: String,
    pub os_env: String,
    pub arch_env: String,
    pub variant_env: String,
    pub limits: Limits,
}

impl CommandCompiler {
    pub fn from_config(build: &BuildConfig) -> Result<CommandCompiler> {
        let build_cmd = build.build_cmd();
        if build_cmd.is_empty() {
            bail!("Build command must not be empty");
        }

        Ok(CommandCompiler {
            deps_cmd: build.deps_cmd(),
            build_cmd,
            tags_flag: build.tags_flag().to_string(),
            root_env: build.root_env().to_string(),
            os_env: build.os_env().to_string(),
            arch_env: build.arch_env().to_string(),
            variant_env: build.variant_env().to_string(),
            limits: Limits::new(build.timeout(), build.max_bytes()),
        })
    }

    pub fn envs(&self, workspace: &Workspace, target: &Target) -> HashMap<String, String> {
        let mut envs = HashMap::new();
        envs.insert(
            self.root_env.clone(),
            workspace.root().to_string_lossy().into_owned(),
        );
        envs.insert(self.os_env.clone(), target.os.clone());
        envs.insert(self.arch_env.clone(), target.arch.clone());
        // set even when empty so a value from our own environment doesn't leak in
        envs.insert(self.variant_env.clone(), target.variant.clone());
        envs
    }

    /// `cmd [flag "tag1 tag2"]`, the flag is left out if there are no tags.
    pub fn args_for(&self, cmd: &[String], tags: &[String]) -> Vec<String> {
        let mut args = cmd[1..].to_vec();
        if !tags.is_empty() && !self.tags_flag.is_empty() {
            args.push(self.tags_flag.clone());
            args.push(tags.join(" "));
        }
        args
    }

    async fn step(
        &self,
        cmd: &[String],
        source: &Path,
        envs: &HashMap<String, String>,
        tags: &[String],
    ) -> Result<Option<String>> {
        let Some(bin) = cmd.first() else {
            return Ok(None);
        };

        let mut opts = Options::new(self.limits);
        opts.envs = envs.clone();
        opts.cwd = Some(source.to_path_buf());

        let output = proc::run(bin, self.args_for(cmd, tags), opts).await?;
        if output.success {
            Ok(None)
        } else {
            Ok(Some(output.diagnostic()))
        }
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(
        &self,
        workspace: &Workspace,
        source: &Path,
        target: &Target,
        tags: &[String],
    ) -> Result<PathBuf, BuildError> {
        let envs = self.envs(workspace, target);

        info!("Fetching dependencies for {}", target);
        if let Some(diagnostic) = self
            .step(&self.deps_cmd, source, &envs, tags)
            .await
            .or_build_err(BuildError::Dependency)?
        {
            return Err(BuildError::Dependency(diagnostic));
        }

        info!("Compiling for {}", target);
        if let Some(diagnostic) = self
            .step(&self.build_cmd, source, &envs, tags)
            .await
            .or_build_err(BuildError::Compile)?
        {
            return Err(BuildError::Compile(diagnostic));
        }

        let dir_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| workspace.name().to_string());
        let binary = source.join(target.binary_name(&dir_name));
        if !binary.is_file() {
            return Err(BuildError::Compile(format!(
                "build finished but {:?} does not exist",
                binary
            )));
        }
        Ok(binary)
    }
}
