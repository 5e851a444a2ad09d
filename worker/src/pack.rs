use crate::workspace;
use crossbuild_common::errors::*;
use crossbuild_common::target::{self, Target};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Bundles a compiled binary and the configured resource paths into
/// `<archive_dir>/<name>_<ref>_<os>_<arch>[_armN].zip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packager {
    pub archive_dir: PathBuf,
    pub resources: Vec<String>,
}

impl Packager {
    pub fn new<P: Into<PathBuf>>(archive_dir: P, resources: Vec<String>) -> Packager {
        Packager {
            archive_dir: archive_dir.into(),
            resources,
        }
    }

    pub fn pack(
        &self,
        source: &Path,
        binary: &Path,
        name: &str,
        git_ref: &str,
        target: &Target,
    ) -> Result<PathBuf, BuildError> {
        let stem = target::archive_stem(name, git_ref, target);
        let staging = self.archive_dir.join(&stem);
        let bundle = staging.join(name);

        workspace::remove_all(&staging).or_build_err(BuildError::Package)?;
        fs::create_dir_all(&bundle)
            .with_context(|| anyhow!("Failed to create {:?}", bundle))
            .or_build_err(BuildError::Package)?;

        let file_name = binary
            .file_name()
            .ok_or_else(|| BuildError::Package(format!("invalid binary path: {:?}", binary)))?;
        move_path(binary, &bundle.join(file_name)).or_build_err(BuildError::Package)?;

        for resource in &self.resources {
            let from = source.join(resource);
            if fs::symlink_metadata(&from).is_err() {
                debug!("Resource {:?} does not exist, skipping", from);
                continue;
            }
            let to = bundle.join(resource);
            if let Err(err) = move_resource(&from, &to) {
                warn!("Failed to add resource {:?} to archive: {:#}", resource, err);
            }
        }

        let dest = self
            .archive_dir
            .join(format!("{}.{}", stem, target::ARCHIVE_EXTENSION));
        write_zip(&staging, &self.archive_dir, &dest).or_build_err(BuildError::Archive)?;
        info!("Created archive {:?}", dest);

        if let Err(err) = workspace::remove_all(&staging) {
            warn!("Failed to remove staging directory: {:#}", err);
        }
        Ok(dest)
    }
}

fn move_resource(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    move_path(from, to)
}

/// rename(2), falling back to copy and delete across filesystems.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    debug!("Rename of {:?} failed, copying instead", from);
    copy_all(from, to).with_context(|| anyhow!("Failed to copy {:?} to {:?}", from, to))?;
    workspace::remove_all(from)
}

fn copy_all(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(from)?;
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write the contents of `dir` to a temporary file next to `dest` and move
/// it into place, readers never observe a partial archive.
fn write_zip(dir: &Path, tmp_dir: &Path, dest: &Path) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".crossbuild-")
        .suffix(".zip.tmp")
        .tempfile_in(tmp_dir)
        .context("Failed to create temporary archive")?;

    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let walker = WalkDir::new(dir).min_depth(1).sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            let rel = entry.path().strip_prefix(dir)?;
            let name = entry_name(rel);
            let mode = entry.metadata()?.permissions().mode();
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(mode);

            if entry.file_type().is_dir() {
                trace!("Adding directory {:?}", name);
                zip.add_directory(name, options)?;
            } else {
                trace!("Adding file {:?}", name);
                zip.start_file(name, options)?;
                let mut f = File::open(entry.path())?;
                io::copy(&mut f, &mut zip)?;
            }
        }
        zip.finish().context("Failed to finish zip archive")?;
    }

    tmp.persist(dest)
        .with_context(|| anyhow!("Failed to move archive to {:?}", dest))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Read;
    use zip::ZipArchive;

    fn entries(path: &Path) -> BTreeSet<String> {
        let zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        zip.file_names().map(String::from).collect()
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut s = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    fn source_tree(dir: &Path) -> PathBuf {
        let src = dir.join("src/app");
        fs::create_dir_all(src.join("templates/partials")).unwrap();
        fs::write(src.join("templates/index.tmpl"), "index").unwrap();
        fs::write(src.join("templates/partials/nav.tmpl"), "nav").unwrap();
        fs::write(src.join("app"), "ELF").unwrap();
        fs::set_permissions(src.join("app"), fs::Permissions::from_mode(0o755)).unwrap();
        src
    }

    #[test]
    fn pack_binary_and_resources() {
        let dir = tempfile::tempdir().unwrap();
        let src = source_tree(dir.path());
        let packager = Packager::new(
            dir.path().join("archive"),
            vec!["templates".into(), "public".into()],
        );

        let archive = packager
            .pack(&src, &src.join("app"), "app", "v1", &Target::new("linux", "arm", "7"))
            .unwrap();
        assert_eq!(archive, dir.path().join("archive/app_v1_linux_arm_arm7.zip"));

        let names = entries(&archive);
        assert!(names.contains("app/app"), "{:?}", names);
        assert!(names.contains("app/templates/index.tmpl"), "{:?}", names);
        assert!(names.contains("app/templates/partials/nav.tmpl"), "{:?}", names);
        assert!(!names.iter().any(|n| n.contains("public")));
        assert_eq!(read_entry(&archive, "app/app"), "ELF");

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mode = zip.by_name("app/app").unwrap().unix_mode().unwrap();
        assert_eq!(mode & 0o111, 0o111);

        // only the archive is left behind
        let left = fs::read_dir(dir.path().join("archive"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(left, &["app_v1_linux_arm_arm7.zip"]);
        assert!(!src.join("app").exists());
    }

    #[test]
    fn repack_replaces_archive() {
        let dir = tempfile::tempdir().unwrap();
        let packager = Packager::new(dir.path().join("archive"), vec![]);
        let target = Target::new("windows", "386", "");

        let src = source_tree(dir.path());
        fs::write(src.join("app.exe"), "first").unwrap();
        packager
            .pack(&src, &src.join("app.exe"), "app", "master", &target)
            .unwrap();

        fs::write(src.join("app.exe"), "second").unwrap();
        // stale staging directory from an interrupted run
        let stale = dir.path().join("archive/app_master_windows_386/app");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("junk"), "junk").unwrap();

        let archive = packager
            .pack(&src, &src.join("app.exe"), "app", "master", &target)
            .unwrap();
        assert_eq!(archive, dir.path().join("archive/app_master_windows_386.zip"));
        assert_eq!(read_entry(&archive, "app/app.exe"), "second");
        assert!(!entries(&archive).contains("app/junk"));
        assert!(!dir.path().join("archive/app_master_windows_386").exists());
    }

    #[test]
    fn missing_binary_is_package_error() {
        let dir = tempfile::tempdir().unwrap();
        let packager = Packager::new(dir.path().join("archive"), vec![]);
        let err = packager
            .pack(
                dir.path(),
                &dir.path().join("nope"),
                "app",
                "v1",
                &Target::new("linux", "amd64", ""),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::Package(_)), "{:?}", err);
        assert!(!dir.path().join("archive/app_v1_linux_amd64.zip").exists());
    }

    #[test]
    fn move_path_copies_trees() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        fs::create_dir_all(from.join("b")).unwrap();
        fs::write(from.join("b/c"), "c").unwrap();
        copy_all(&from, &dir.path().join("x")).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("x/b/c")).unwrap(), "c");

        move_path(&from, &dir.path().join("y")).unwrap();
        assert!(!from.exists());
        assert!(dir.path().join("y/b/c").exists());
    }
}
