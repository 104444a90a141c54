//! Unpack a delivered package.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    /// Entries whose names would escape the destination.
    pub rejected: usize,
}

/// Extract every entry of `archive` below `dest`.
///
/// Relative paths and unix modes are preserved. Parent directories are
/// created before the files beneath them; directory modes are applied last
/// so read-only directories do not block their own contents.
pub fn extract(archive: &Path, dest: &Path) -> Result<ExtractSummary> {
    std::fs::create_dir_all(dest)
        .map_err(|e| Error::io(format!("failed to create {}", dest.display()), e))?;

    let file = File::open(archive)
        .map_err(|e| Error::io(format!("failed to open {}", archive.display()), e))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::archive(format!("failed to read {}", archive.display()), e))?;

    let mut summary = ExtractSummary::default();
    let mut directory_modes: Vec<(PathBuf, u32)> = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| Error::archive(format!("failed to read entry {i}"), e))?;

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(name = entry.name(), "skipping entry with unsafe path");
            summary.rejected += 1;
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            create_dir(&outpath)?;
            if let Some(mode) = entry.unix_mode() {
                directory_modes.push((outpath, mode));
            }
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            create_dir(parent)?;
        }
        let mut out = File::create(&outpath)
            .map_err(|e| Error::io(format!("failed to create {}", outpath.display()), e))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| Error::io(format!("failed to extract {}", entry.name()), e))?;

        if let Some(mode) = entry.unix_mode() {
            set_mode(&outpath, mode)?;
        }
        summary.files += 1;
    }

    for (path, mode) in directory_modes.iter().rev() {
        set_mode(path, *mode)?;
    }

    tracing::debug!(
        archive = %archive.display(),
        files = summary.files,
        directories = summary.directories,
        "archive extracted"
    );
    Ok(summary)
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::io(format!("failed to create directory {}", path.display()), e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::io(format!("failed to set permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, build: impl FnOnce(&mut zip::ZipWriter<File>)) {
        let file = File::create(path).expect("create zip");
        let mut zip = zip::ZipWriter::new(file);
        build(&mut zip);
        zip.finish().expect("finish zip");
    }

    #[test]
    fn extracts_nested_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("pkg.zip");
        write_zip(&archive, |zip| {
            let options = SimpleFileOptions::default();
            zip.start_file("app-selected.deb", options).unwrap();
            zip.write_all(b"binary").unwrap();
            zip.add_directory("env/", options).unwrap();
            zip.start_file("env/compose/docker-compose.yml", options)
                .unwrap();
            zip.write_all(b"services: {}").unwrap();
        });

        let dest = temp.path().join("out");
        let summary = extract(&archive, &dest).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(
            std::fs::read_to_string(dest.join("env/compose/docker-compose.yml")).unwrap(),
            "services: {}"
        );
        assert!(dest.join("app-selected.deb").is_file());
    }

    #[test]
    fn skips_entries_escaping_destination() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, |zip| {
            let options = SimpleFileOptions::default();
            zip.start_file("../escaped.txt", options).unwrap();
            zip.write_all(b"nope").unwrap();
            zip.start_file("ok.txt", options).unwrap();
            zip.write_all(b"fine").unwrap();
        });

        let dest = temp.path().join("out");
        let summary = extract(&archive, &dest).unwrap();

        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.files, 1);
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_file_modes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("modes.zip");
        write_zip(&archive, |zip| {
            zip.start_file(
                "bin/run.sh",
                SimpleFileOptions::default().unix_permissions(0o755),
            )
            .unwrap();
            zip.write_all(b"#!/bin/sh\n").unwrap();
            zip.start_file(
                "conf.env",
                SimpleFileOptions::default().unix_permissions(0o600),
            )
            .unwrap();
            zip.write_all(b"A=1\n").unwrap();
        });

        let dest = temp.path().join("out");
        extract(&archive, &dest).unwrap();

        let mode = |p: &str| {
            std::fs::metadata(dest.join(p))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("bin/run.sh"), 0o755);
        assert_eq!(mode("conf.env"), 0o600);
    }

    #[test]
    fn invalid_zip_fails_with_archive_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        std::fs::write(&archive, b"not a zip file").unwrap();

        let err = extract(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::Archive { .. }));
    }
}
