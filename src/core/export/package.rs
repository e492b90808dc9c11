//! Staged, atomically published package directories.
//!
//! Everything is written under `<out>/.tmp/<export_id>` first. Only a fully
//! written and synced staging directory is renamed to `<out>/<archive_name>`,
//! so readers never observe a partial package.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tracing::debug;

use super::ExportFile;
use crate::error::{KbError, Result};

const STAGING_DIR: &str = ".tmp";

/// Rendered package ready to be written
pub struct PackageContents<'a> {
    pub archive_name: &'a str,
    pub export_id: &'a str,
    pub files: &'a [ExportFile],
    pub manifest: &'a str,
    pub instructions: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub path: PathBuf,
    /// Bytes of every written file, manifest and instructions included
    pub bytes: u64,
}

pub trait Packager: Send + Sync {
    fn package(&self, contents: &PackageContents<'_>) -> Result<PackagedArchive>;
}

#[derive(Debug, Clone)]
pub struct DirectoryPackager {
    pub output_dir: PathBuf,
    pub base_archive_dir: String,
    pub manifest_filename: String,
    pub instructions_filename: String,
}

impl DirectoryPackager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            base_archive_dir: "knowledge-base".to_string(),
            manifest_filename: "manifest.yaml".to_string(),
            instructions_filename: "import-instructions.md".to_string(),
        }
    }

    fn stage(&self, staging: &Path, contents: &PackageContents<'_>) -> io::Result<u64> {
        fs::create_dir_all(staging)?;
        let base = staging.join(&self.base_archive_dir);
        let mut bytes = 0u64;

        for f in contents.files {
            let dest = base.join(&f.relative_path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, f.content.as_bytes())?;
            bytes += f.content.len() as u64;
        }

        for (name, text) in [
            (&self.manifest_filename, contents.manifest),
            (&self.instructions_filename, contents.instructions),
        ] {
            write_synced(&staging.join(name), text)?;
            bytes += text.len() as u64;
        }

        let _ = sync_dir(&base);
        let _ = sync_dir(staging);
        Ok(bytes)
    }
}

impl Packager for DirectoryPackager {
    fn package(&self, contents: &PackageContents<'_>) -> Result<PackagedArchive> {
        let final_dir = self.output_dir.join(contents.archive_name);
        let staging_root = self.output_dir.join(STAGING_DIR);
        let staging = staging_root.join(contents.export_id);
        let discard = || {
            let _ = fs::remove_dir_all(&staging);
            let _ = fs::remove_dir(&staging_root);
        };

        let bytes = match self.stage(&staging, contents) {
            Ok(bytes) => bytes,
            Err(err) => {
                discard();
                return Err(KbError::package(&staging, err));
            }
        };
        if let Err(err) = publish(&staging, &final_dir) {
            discard();
            return Err(KbError::package(&final_dir, err));
        }

        let _ = sync_dir(&self.output_dir);
        // Leaves the staging root in place when other exports use it
        let _ = fs::remove_dir(&staging_root);
        debug!(path = %final_dir.display(), bytes, "package published");
        Ok(PackagedArchive {
            path: final_dir,
            bytes,
        })
    }
}

/// Move `staging` to `final_dir`, failing with `AlreadyExists` when anything
/// is already there.
fn publish(staging: &Path, final_dir: &Path) -> io::Result<()> {
    let taken = |err: io::Error| match err.kind() {
        io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
            io::Error::new(io::ErrorKind::AlreadyExists, "package already exists")
        }
        _ => err,
    };

    claim(final_dir).map_err(taken)?;
    fs::rename(staging, final_dir).map_err(|err| {
        release(final_dir);
        taken(err)
    })
}

/// `rename` replaces an empty directory on unix, so the name is taken with
/// `create_dir` first.
#[cfg(unix)]
fn claim(dir: &Path) -> io::Result<()> {
    fs::create_dir(dir)
}

/// Only removes the claim while it is still empty.
#[cfg(unix)]
fn release(dir: &Path) {
    let _ = fs::remove_dir(dir);
}

#[cfg(not(unix))]
fn claim(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn release(_dir: &Path) {}

/// Write via `<path>.tmp` and rename.
fn write_synced(path: &Path, text: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, text)?;
    File::open(&tmp)?.sync_all().ok();
    fs::rename(&tmp, path)
}

#[cfg(unix)]
fn sync_dir(p: &Path) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_p: &Path) -> io::Result<()> {
    Ok(())
}

/// Sortable, filesystem-safe export id.
pub fn generate_export_id() -> String {
    let ts = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let alphabet = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..10)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect();
    format!("{ts}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file(rel: &str, body: &str) -> ExportFile {
        ExportFile {
            original_path: rel.into(),
            relative_path: rel.into(),
            filename: rel.rsplit('/').next().unwrap_or(rel).into(),
            ref_id: None,
            category: "c".into(),
            size: body.len() as u64,
            checksum: String::new(),
            content: body.into(),
            converted: false,
            target_version: "4.3".into(),
        }
    }

    #[test]
    fn publishes_complete_package() -> Result<()> {
        let tmp = TempDir::new()?;
        let files = [file("generic/a.md", "abc"), file("top.md", "z")];
        let packager = DirectoryPackager::new(tmp.path());

        let archive = packager.package(&PackageContents {
            archive_name: "pkg",
            export_id: "id1",
            files: &files,
            manifest: "archive: {}\n",
            instructions: "# hi\n",
        })?;

        assert_eq!(archive.path, tmp.path().join("pkg"));
        assert_eq!(archive.bytes, 3 + 1 + 12 + 5);
        assert_eq!(
            fs::read_to_string(archive.path.join("knowledge-base/generic/a.md"))?,
            "abc"
        );
        assert!(archive.path.join("manifest.yaml").is_file());
        assert!(archive.path.join("import-instructions.md").is_file());
        assert!(!archive.path.join("manifest.yaml.tmp").exists());
        assert!(!tmp.path().join(STAGING_DIR).exists());
        Ok(())
    }

    #[test]
    fn existing_target_is_not_overwritten() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::create_dir(tmp.path().join("pkg"))?;
        fs::write(tmp.path().join("pkg/keep.txt"), "x")?;

        let err = DirectoryPackager::new(tmp.path())
            .package(&PackageContents {
                archive_name: "pkg",
                export_id: "id1",
                files: &[file("a.md", "a")],
                manifest: "",
                instructions: "",
            })
            .unwrap_err();

        assert!(matches!(err, KbError::Package { .. }));
        assert!(tmp.path().join("pkg/keep.txt").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn empty_existing_target_is_not_replaced() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::create_dir(tmp.path().join("pkg"))?;

        let err = DirectoryPackager::new(tmp.path())
            .package(&PackageContents {
                archive_name: "pkg",
                export_id: "id1",
                files: &[file("a.md", "a")],
                manifest: "",
                instructions: "",
            })
            .unwrap_err();

        match err {
            KbError::Package { path, source } => {
                assert_eq!(path, tmp.path().join("pkg"));
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(fs::read_dir(tmp.path().join("pkg"))?.count(), 0);
        assert!(!tmp.path().join(STAGING_DIR).exists());
        Ok(())
    }

    #[test]
    fn failed_staging_leaves_nothing_behind() -> Result<()> {
        let tmp = TempDir::new()?;
        // A file where a directory is needed makes staging fail
        let files = [file("a.md", "a"), file("a.md/b.md", "b")];

        let err = DirectoryPackager::new(tmp.path())
            .package(&PackageContents {
                archive_name: "pkg",
                export_id: "id1",
                files: &files,
                manifest: "",
                instructions: "",
            })
            .unwrap_err();

        assert!(matches!(err, KbError::Package { .. }));
        assert!(!tmp.path().join("pkg").exists());
        assert!(!tmp.path().join(STAGING_DIR).exists());
        Ok(())
    }

    #[test]
    fn export_ids_are_unique_and_safe() {
        let a = generate_export_id();
        let b = generate_export_id();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || "-_TZ".contains(c)));
    }
}
