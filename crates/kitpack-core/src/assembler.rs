//! Request-scoped package assembly.
//!
//! `ResolveVersion -> FetchBinary + FetchIntegrationArchive -> Combine -> Deliver`
//!
//! Every artifact of an invocation lives in one private temporary directory
//! owned by the pipeline (and then by the returned [`AssembledPackage`]).
//! Whatever the exit path, success, failure or a dropped future, the
//! directory and everything in it is removed when its owner goes away.

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::archive::{self, CombineSummary};
use crate::error::{AssembleError, Error, Result, Stage, StageExt};
use crate::fetch::{ArtifactFetcher, FetchedFile};
use crate::resolver::{IntegrationResolver, ReleaseResolver};

const WORKDIR_PREFIX: &str = "kitpack-";
const BINARY_FILE: &str = "binary.deb";
const INTEGRATION_FILE: &str = "integration.zip";

/// File name of the combined archive for `integration`.
pub fn package_file_name(asset_token: &str, integration: &str) -> String {
    format!("{asset_token}-{integration}.zip")
}

/// Orchestrates resolver, fetcher and combiner for one request at a time.
///
/// Holds only read-only configuration; concurrent calls share nothing.
#[derive(Debug, Clone)]
pub struct Assembler {
    releases: ReleaseResolver,
    integrations: IntegrationResolver,
    fetcher: ArtifactFetcher,
    binary_name: String,
    asset_token: String,
    scratch_root: Option<PathBuf>,
}

impl Assembler {
    pub fn new(
        releases: ReleaseResolver,
        integrations: IntegrationResolver,
        fetcher: ArtifactFetcher,
        binary_name: impl Into<String>,
        asset_token: impl Into<String>,
    ) -> Self {
        Self {
            releases,
            integrations,
            fetcher,
            binary_name: binary_name.into(),
            asset_token: asset_token.into(),
            scratch_root: None,
        }
    }

    /// Create request directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Build the combined archive for `version` (a tag or `latest`) and
    /// `integration` (a branch name).
    pub async fn assemble(
        &self,
        version: &str,
        integration: &str,
    ) -> Result<AssembledPackage, AssembleError> {
        tracing::info!(version, integration, "assembly requested");

        let tag = self
            .releases
            .resolve(version)
            .await
            .at(Stage::ResolveVersion)?;

        let workdir = self.workdir().at(Stage::FetchBinary)?;

        let binary_path = workdir.path().join(BINARY_FILE);
        let archive_path = workdir.path().join(INTEGRATION_FILE);
        let (binary, source) = tokio::try_join!(
            self.fetch_binary(&tag, &binary_path),
            self.fetch_integration(integration, &archive_path),
        )?;

        let file_name = package_file_name(&self.asset_token, integration);
        let output = workdir.path().join(&file_name);
        let (workdir, summary) = self
            .combine(workdir, binary.path, source.path, output.clone())
            .await
            .at(Stage::Combine)?;

        let size = std::fs::metadata(&output)
            .map_err(|e| Error::io(format!("failed to stat {}", output.display()), e))
            .at(Stage::Combine)?
            .len();

        tracing::info!(%tag, integration, size, "package assembled");
        Ok(AssembledPackage {
            workdir,
            path: output,
            file_name,
            tag,
            size,
            summary,
        })
    }

    fn workdir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| Error::io("failed to create temp directory", e))
    }

    async fn fetch_binary(&self, tag: &str, dest: &Path) -> Result<FetchedFile, AssembleError> {
        let asset = self
            .releases
            .binary_asset(tag)
            .await
            .at(Stage::FetchBinary)?;
        tracing::debug!(asset = %asset.name, "selected release asset");
        self.fetcher
            .fetch(&asset.download_url, dest)
            .await
            .at(Stage::FetchBinary)
    }

    async fn fetch_integration(
        &self,
        branch: &str,
        dest: &Path,
    ) -> Result<FetchedFile, AssembleError> {
        let url = self.integrations.archive_url(branch);
        self.fetcher
            .fetch(&url, dest)
            .await
            .map_err(|e| match e {
                Error::Rejected { status: 404, .. } => Error::IntegrationNotFound {
                    repo: self.integrations.repo().to_string(),
                    branch: branch.to_string(),
                },
                other => other,
            })
            .at(Stage::FetchIntegrationArchive)
    }

    /// Runs on the blocking pool. The task owns `workdir` until it finishes,
    /// so a dropped caller cannot remove the directory mid-write.
    async fn combine(
        &self,
        workdir: TempDir,
        binary: PathBuf,
        source: PathBuf,
        output: PathBuf,
    ) -> Result<(TempDir, CombineSummary)> {
        let binary_name = self.binary_name.clone();
        tokio::task::spawn_blocking(move || {
            archive::combine(&binary, &binary_name, &source, &output).map(|s| (workdir, s))
        })
        .await
        .map_err(|e| Error::io("combine task did not complete", std::io::Error::other(e)))?
    }
}

/// A finished combined archive, owned by the caller until delivered.
///
/// Dropping it deletes the archive and every intermediate download.
#[derive(Debug)]
pub struct AssembledPackage {
    workdir: TempDir,
    path: PathBuf,
    file_name: String,
    tag: String,
    size: u64,
    summary: CombineSummary,
}

impl AssembledPackage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attachment file name, e.g. `widget-postgres.zip`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The concrete release tag that was packaged.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn summary(&self) -> &CombineSummary {
        &self.summary
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Open the archive for streaming to a caller.
    pub fn open(&self) -> Result<File, AssembleError> {
        File::open(&self.path)
            .map_err(|e| Error::io(format!("failed to open {}", self.path.display()), e))
            .at(Stage::Deliver)
    }

    /// Copy the archive to `dest`, then release all temporary storage.
    ///
    /// `dest` only ever appears complete.
    pub fn deliver_to(self, dest: &Path) -> Result<PathBuf, AssembleError> {
        deliver(&self.path, dest).at(Stage::Deliver)?;
        tracing::info!(dest = %dest.display(), bytes = self.size, "package delivered");
        Ok(dest.to_path_buf())
    }
}

fn deliver(src: &Path, dest: &Path) -> Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut staging = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| Error::io(format!("failed to create file in {}", dir.display()), e))?;
    let mut source =
        File::open(src).map_err(|e| Error::io(format!("failed to open {}", src.display()), e))?;
    std::io::copy(&mut source, staging.as_file_mut())
        .map_err(|e| Error::io(format!("failed to write {}", dest.display()), e))?;
    staging
        .persist(dest)
        .map_err(|e| Error::io(format!("failed to move package to {}", dest.display()), e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_combines_token_and_integration() {
        assert_eq!(package_file_name("widget", "postgres"), "widget-postgres.zip");
    }

    #[test]
    fn deliver_copies_and_leaves_no_staging_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let src = temp.path().join("src.zip");
        std::fs::write(&src, b"PK\x05\x06").unwrap();
        let out_dir = temp.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let dest = out_dir.join("pkg.zip");

        deliver(&src, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"PK\x05\x06");
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 1);
    }

    #[test]
    fn deliver_into_missing_directory_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let src = temp.path().join("src.zip");
        std::fs::write(&src, b"data").unwrap();

        let err = deliver(&src, &temp.path().join("missing/pkg.zip")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LocalIo);
    }
}
