use async_trait::async_trait;
use crossbuild_common::errors::BuildError;
use crossbuild_worker::fetch::{Fetcher, Snapshot};
use crossbuild_worker::workspace::Workspace;
use std::fs;
use std::path::PathBuf;

pub const MISSING_REF: &str = "missing";
pub const BROKEN_REF: &str = "broken";

/// Writes a tiny source tree instead of downloading one.
pub struct StubFetcher;

#[async_trait]
impl Fetcher for StubFetcher {
    async fn pin(&self, _workspace: &Workspace, git_ref: &str) -> Result<Snapshot, BuildError> {
        if git_ref == MISSING_REF {
            return Err(BuildError::Fetch("404 Not Found".into()));
        }
        Ok(Snapshot::unpinned(git_ref))
    }

    async fn fetch(&self, workspace: &Workspace, snapshot: &Snapshot) -> Result<PathBuf, BuildError> {
        let git_ref = snapshot.git_ref();
        let src = workspace.source_dir();
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(src.join("templates"))?;
            fs::write(src.join("main.go"), format!("// {}\npackage main\n", git_ref))?;
            fs::write(src.join("templates/index.tmpl"), "<h1>{{.}}</h1>\n")?;
            if git_ref == BROKEN_REF {
                fs::write(src.join("FAIL"), "./main.go:3:1: undefined: run\n")?;
            }
            Ok(())
        };
        write().map_err(|err| BuildError::Extract(err.to_string()))?;
        Ok(src)
    }
}
