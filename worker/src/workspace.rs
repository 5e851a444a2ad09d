use crossbuild_common::errors::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Prefix of scratch directories created next to the source tree.
pub const SCRATCH_PREFIX: &str = ".crossbuild-";

/// The single directory tree sources are fetched into and compiled in,
/// laid out like a GOPATH: `<root>/src/<import path>`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    name: String,
    src_parent: PathBuf,
}

impl Workspace {
    pub fn new<P: Into<PathBuf>>(root: P, import_path: &str) -> Result<Workspace> {
        let root = root.into();
        let import_path = Path::new(import_path.trim_matches('/'));
        let name = import_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format_err!("Import path has no base name: {:?}", import_path))?
            .to_string();

        let mut src_parent = root.join("src");
        if let Some(parent) = import_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            src_parent.push(parent);
        }

        Ok(Workspace {
            root,
            name,
            src_parent,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base name of the repository, also used for the binary and archives.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src_parent(&self) -> &Path {
        &self.src_parent
    }

    /// Fixed location of the buildable source tree.
    pub fn source_dir(&self) -> PathBuf {
        self.src_parent.join(&self.name)
    }

    /// Persistent clone used in checkout mode, never built in.
    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(".mirror").join(format!("{}.git", self.name))
    }

    /// Remove the source tree and any scratch leftovers so the next fetch
    /// starts from nothing.
    pub fn reset(&self) -> std::result::Result<(), BuildError> {
        debug!("Resetting workspace {:?}", self.src_parent);
        remove_all(&self.source_dir()).or_build_err(BuildError::Workspace)?;

        match fs::read_dir(&self.src_parent) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.or_build_err(BuildError::Workspace)?;
                    let file_name = entry.file_name();
                    if file_name.to_string_lossy().starts_with(SCRATCH_PREFIX) {
                        remove_all(&entry.path()).or_build_err(BuildError::Workspace)?;
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => (),
            Err(err) => {
                return Err(err)
                    .with_context(|| anyhow!("Failed to list {:?}", self.src_parent))
                    .or_build_err(BuildError::Workspace)
            }
        }

        fs::create_dir_all(&self.src_parent)
            .with_context(|| anyhow!("Failed to create {:?}", self.src_parent))
            .or_build_err(BuildError::Workspace)?;
        Ok(())
    }

    /// Scratch directory on the same filesystem as the source tree, removed
    /// when the returned handle is dropped.
    pub fn scratch_dir(&self) -> Result<TempDir> {
        fs::create_dir_all(&self.src_parent)?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.src_parent)?;
        Ok(dir)
    }

    /// Scratch directory that lives for a whole build event. It is outside
    /// of the source tree, `reset` leaves it alone.
    pub fn event_dir(&self) -> Result<TempDir> {
        let parent = self.root.join(".events");
        fs::create_dir_all(&parent)
            .with_context(|| anyhow!("Failed to create {:?}", parent))?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)?;
        Ok(dir)
    }
}

/// `rm -rf`, a missing path is fine.
pub fn remove_all(path: &Path) -> Result<()> {
    let res = match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => Err(err),
    };
    res.with_context(|| anyhow!("Failed to remove {:?}", path))
}
