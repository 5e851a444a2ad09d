use crate::download;
use crate::proc::{self, Limits, Options, Output};
use crate::workspace::{self, Workspace};
use async_trait::async_trait;
use crossbuild_common::errors::*;
use flate2::read::GzDecoder;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::task;
use url::form_urlencoded;

/// What a reference resolved to when a build event started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pin {
    /// Resolved again on every fetch.
    Unpinned,
    Commit(String),
    Archive(PathBuf),
}

/// A reference pinned to one state of the repository. Every target of a
/// build event is built from the same snapshot.
#[derive(Debug)]
pub struct Snapshot {
    git_ref: String,
    pin: Pin,
    _scratch: Option<TempDir>,
}

impl Snapshot {
    pub fn unpinned(git_ref: &str) -> Snapshot {
        Snapshot {
            git_ref: git_ref.to_string(),
            pin: Pin::Unpinned,
            _scratch: None,
        }
    }

    pub fn commit(git_ref: &str, commit: String) -> Snapshot {
        Snapshot {
            git_ref: git_ref.to_string(),
            pin: Pin::Commit(commit),
            _scratch: None,
        }
    }

    /// The downloaded archive is removed together with `scratch` once the
    /// snapshot is dropped.
    pub fn archive(git_ref: &str, archive: PathBuf, scratch: TempDir) -> Snapshot {
        Snapshot {
            git_ref: git_ref.to_string(),
            pin: Pin::Archive(archive),
            _scratch: Some(scratch),
        }
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn pin(&self) -> &Pin {
        &self.pin
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve the reference once, at the start of a build event.
    async fn pin(&self, _workspace: &Workspace, git_ref: &str) -> Result<Snapshot, BuildError> {
        Ok(Snapshot::unpinned(git_ref))
    }

    /// Make the snapshot available as a buildable tree at
    /// `Workspace::source_dir`. The workspace has been reset before `fetch`
    /// is called.
    async fn fetch(&self, workspace: &Workspace, snapshot: &Snapshot) -> Result<PathBuf, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Result<ArchiveFormat> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Ok(ArchiveFormat::Tar)
        } else {
            bail!("Unsupported archive format: {:?}", path)
        }
    }
}

pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let format = ArchiveFormat::detect(archive)?;
    debug!("Unpacking {:?} ({:?}) to {:?}", archive, format, dest);

    let file = File::open(archive).with_context(|| anyhow!("Failed to open {:?}", archive))?;
    match format {
        ArchiveFormat::Zip => {
            let mut zip =
                zip::ZipArchive::new(BufReader::new(file)).context("Failed to open zip")?;
            zip.extract(dest).context("Failed to extract zip")?;
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
            tar.unpack(dest).context("Failed to extract tarball")?;
        }
        ArchiveFormat::Tar => {
            let mut tar = tar::Archive::new(BufReader::new(file));
            tar.unpack(dest).context("Failed to extract tarball")?;
        }
    }
    Ok(())
}

/// Snapshot archives contain a single top-level directory that is usually
/// named `<name>-<ref>`, find it.
pub fn find_top_level(dir: &Path, name: &str) -> Result<PathBuf, BuildError> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).or_build_err(BuildError::Extract)? {
        let entry = entry.or_build_err(BuildError::Extract)?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with(name) && entry.path().is_dir() {
            candidates.push(file_name);
        }
    }
    candidates.sort();

    let first = candidates.into_iter().next().ok_or_else(|| {
        BuildError::Layout(format!(
            "archive does not contain a directory starting with {:?}",
            name
        ))
    })?;
    Ok(dir.join(first))
}

/// Extract a downloaded snapshot in `scratch` and move its top-level
/// directory to the fixed source path.
pub fn install_archive(
    workspace: &Workspace,
    archive: &Path,
    scratch: &Path,
) -> Result<PathBuf, BuildError> {
    let tree = scratch.join("tree");
    unpack(archive, &tree).or_build_err(BuildError::Extract)?;

    let top = find_top_level(&tree, workspace.name())?;
    let dest = workspace.source_dir();
    debug!("Moving {:?} to {:?}", top, dest);
    fs::rename(&top, &dest)
        .with_context(|| anyhow!("Failed to move {:?} to {:?}", top, dest))
        .or_build_err(BuildError::Layout)?;
    Ok(dest)
}

/// Downloads a snapshot of the reference once per build event and extracts
/// it again for every target.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    url_template: String,
}

impl ArchiveFetcher {
    pub fn new<I: Into<String>>(url_template: I) -> ArchiveFetcher {
        ArchiveFetcher {
            url_template: url_template.into(),
        }
    }

    /// Substitute `{ref}` in the template. Every path segment of the
    /// reference is percent-encoded.
    pub fn archive_url(&self, git_ref: &str) -> String {
        let encoded = git_ref
            .split('/')
            .map(|segment| form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>())
            .collect::<Vec<_>>()
            .join("/");
        self.url_template.replace("{ref}", &encoded)
    }
}

#[async_trait]
impl Fetcher for ArchiveFetcher {
    async fn pin(&self, workspace: &Workspace, git_ref: &str) -> Result<Snapshot, BuildError> {
        let url = self.archive_url(git_ref);
        let scratch = workspace.event_dir().or_build_err(BuildError::Workspace)?;

        let archive = download::download(&url, scratch.path())
            .await
            .with_context(|| anyhow!("Failed to download {:?}", url))
            .or_build_err(BuildError::Fetch)?;

        Ok(Snapshot::archive(git_ref, archive, scratch))
    }

    async fn fetch(&self, workspace: &Workspace, snapshot: &Snapshot) -> Result<PathBuf, BuildError> {
        let Pin::Archive(archive) = snapshot.pin() else {
            return Err(BuildError::Fetch(format!(
                "no archive was downloaded for {:?}",
                snapshot.git_ref()
            )));
        };
        let scratch = workspace
            .scratch_dir()
            .or_build_err(BuildError::Workspace)?;

        let ws = workspace.clone();
        let archive = archive.clone();
        let scratch_path = scratch.path().to_path_buf();
        let res = task::spawn_blocking(move || install_archive(&ws, &archive, &scratch_path))
            .await
            .or_build_err(BuildError::Extract)?;

        if let Err(err) = scratch.close() {
            warn!("Failed to remove scratch directory: {:#}", err);
        }
        res
    }
}

/// Keeps a mirror clone of the repository and materialises each reference
/// as a detached worktree.
#[derive(Debug, Clone)]
pub struct GitCheckout {
    clone_url: String,
    limits: Limits,
}

impl GitCheckout {
    pub fn new<I: Into<String>>(clone_url: I, limits: Limits) -> GitCheckout {
        GitCheckout {
            clone_url: clone_url.into(),
            limits,
        }
    }

    async fn git(&self, args: Vec<OsString>) -> Result<Output, BuildError> {
        let mut opts = Options::new(self.limits);
        opts.envs.insert("GIT_TERMINAL_PROMPT".into(), "0".into());

        let output = proc::run("git", &args, opts)
            .await
            .or_build_err(BuildError::Checkout)?;
        if !output.success {
            return Err(BuildError::Checkout(output.diagnostic()));
        }
        Ok(output)
    }

    async fn update_mirror(&self, mirror: &Path) -> Result<(), BuildError> {
        if mirror.join("HEAD").exists() {
            info!("Updating mirror {:?}", mirror);
            self.git(vec![
                "--git-dir".into(),
                mirror.into(),
                "fetch".into(),
                "--prune".into(),
                "--force".into(),
                "origin".into(),
            ])
            .await?;
        } else {
            info!("Cloning {:?} into {:?}", self.clone_url, mirror);
            // a half finished clone from an earlier crash
            workspace::remove_all(mirror).or_build_err(BuildError::Checkout)?;
            if let Some(parent) = mirror.parent() {
                fs::create_dir_all(parent).or_build_err(BuildError::Checkout)?;
            }
            self.git(vec![
                "clone".into(),
                "--mirror".into(),
                "--".into(),
                self.clone_url.clone().into(),
                mirror.into(),
            ])
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for GitCheckout {
    async fn pin(&self, workspace: &Workspace, git_ref: &str) -> Result<Snapshot, BuildError> {
        let mirror = workspace.mirror_dir();
        self.update_mirror(&mirror).await?;

        let commit = self
            .git(vec![
                "--git-dir".into(),
                mirror.into(),
                "rev-parse".into(),
                "--verify".into(),
                "--quiet".into(),
                format!("{}^{{commit}}", git_ref).into(),
            ])
            .await
            .map_err(|_| BuildError::Checkout(format!("reference {:?} does not resolve", git_ref)))?
            .stdout_str()
            .trim()
            .to_string();
        info!("Resolved {:?} to {}", git_ref, commit);

        Ok(Snapshot::commit(git_ref, commit))
    }

    async fn fetch(&self, workspace: &Workspace, snapshot: &Snapshot) -> Result<PathBuf, BuildError> {
        let Pin::Commit(commit) = snapshot.pin() else {
            return Err(BuildError::Checkout(format!(
                "{:?} was not resolved to a commit",
                snapshot.git_ref()
            )));
        };
        let mirror = workspace.mirror_dir();

        // the previous worktree directory is gone after the workspace reset
        self.git(vec![
            "--git-dir".into(),
            mirror.clone().into(),
            "worktree".into(),
            "prune".into(),
        ])
        .await?;

        let dest = workspace.source_dir();
        self.git(vec![
            "--git-dir".into(),
            mirror.into(),
            "worktree".into(),
            "add".into(),
            "--force".into(),
            "--detach".into(),
            dest.clone().into(),
            commit.into(),
        ])
        .await?;

        Ok(dest)
    }
}
