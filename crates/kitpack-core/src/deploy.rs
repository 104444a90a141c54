//! Consumer-side deployment: unpack a delivered package, find the
//! directory holding the deployment manifests and run the build tool there.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::archive;
use crate::error::{Error, Result};

/// Build manifest a deploy root must contain.
pub const BUILD_MANIFEST: &str = "Makefile";
/// Orchestration manifest a deploy root must contain.
pub const COMPOSE_MANIFEST: &str = "docker-compose.yml";

/// Whether `dir` directly contains both deployment manifests.
pub fn is_deploy_root(dir: &Path) -> bool {
    dir.join(BUILD_MANIFEST).is_file() && dir.join(COMPOSE_MANIFEST).is_file()
}

/// Depth-first search below `base` (inclusive) for the first deploy root.
///
/// Children are visited in file-name order and symlinks are not followed.
/// There is no fallback: a tree without a qualifying directory is an error.
pub fn find_deploy_root(base: &Path) -> Result<PathBuf> {
    match search(base)? {
        Some(found) => {
            tracing::info!(root = %found.display(), "found deploy root");
            Ok(found)
        }
        None => Err(Error::DeployRootNotFound {
            searched: base.to_path_buf(),
            build_manifest: BUILD_MANIFEST,
            compose_manifest: COMPOSE_MANIFEST,
        }),
    }
}

fn search(dir: &Path) -> Result<Option<PathBuf>> {
    if is_deploy_root(dir) {
        return Ok(Some(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::io(format!("failed to read directory {}", dir.display()), e))?;
    let mut children: Vec<_> = entries
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(format!("failed to read entries of {}", dir.display()), e))?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let file_type = child
            .file_type()
            .map_err(|e| Error::io(format!("failed to stat {}", child.path().display()), e))?;
        if file_type.is_dir() {
            if let Some(found) = search(&child.path())? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// An extracted package and its deploy root.
///
/// Owns the private extraction directory, which is removed on drop.
#[derive(Debug)]
pub struct Deployment {
    workdir: tempfile::TempDir,
    root: PathBuf,
}

impl Deployment {
    /// Extract `archive` into a fresh private directory and locate the
    /// deploy root inside it.
    pub fn prepare(archive_path: &Path) -> Result<Self> {
        Self::prepare_in(archive_path, &std::env::temp_dir())
    }

    /// Like [`Deployment::prepare`], with the extraction directory under `parent`.
    pub fn prepare_in(archive_path: &Path, parent: &Path) -> Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("kitpack-deploy-")
            .tempdir_in(parent)
            .map_err(|e| Error::io("failed to create extraction directory", e))?;

        archive::extract(archive_path, workdir.path())?;
        let root = find_deploy_root(workdir.path())?;

        Ok(Self { workdir, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Keep the extracted tree on disk and return the deploy root.
    pub fn keep(self) -> PathBuf {
        let _ = self.workdir.keep();
        self.root
    }
}

/// Runs the build tool's `build` then `start` targets in a deploy root.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    program: String,
    targets: Vec<String>,
}

impl Default for BuildRunner {
    fn default() -> Self {
        Self::new("make")
    }
}

impl BuildRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            targets: vec!["build".to_string(), "start".to_string()],
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Run each target in order with inherited stdio; stop at the first failure.
    pub fn run(&self, root: &Path) -> Result<()> {
        for target in &self.targets {
            let command = format!("{} {}", self.program, target);
            tracing::info!(%command, dir = %root.display(), "running build step");

            let status = Command::new(&self.program)
                .arg(target)
                .current_dir(root)
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| Error::io(format!("failed to run `{command}`"), e))?;

            if !status.success() {
                return Err(Error::Command {
                    command,
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Check that the container engine answers `docker version`.
pub fn check_docker() -> Result<()> {
    let status = Command::new("docker")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| Error::io("failed to run `docker version`", e))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Command {
            command: "docker version".to_string(),
            status: status.to_string(),
        })
    }
}
