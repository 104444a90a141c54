//! Typed failures shared by every pipeline component.
//!
//! Each [`Error`] variant belongs to exactly one [`ErrorKind`]. Components
//! never retry; they return the failure and let the caller decide. The
//! assembler annotates failures with the [`Stage`] that produced them.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Coarse failure classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport failure or undecodable upstream response.
    UpstreamUnavailable,
    /// Upstream answered with a non-2xx status.
    UpstreamRejected,
    /// No matching release, asset, branch or deploy root.
    NotFound,
    /// Local filesystem, archive or subprocess failure.
    LocalIo,
    /// The operation ran out of time or was cancelled.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::UpstreamUnavailable => "upstream unavailable",
            ErrorKind::UpstreamRejected => "upstream rejected",
            ErrorKind::NotFound => "not found",
            ErrorKind::LocalIo => "local I/O",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("{url} answered with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("{url} answered with HTTP {status}: {message}")]
    ApiRejected {
        url: String,
        status: u16,
        message: String,
    },

    #[error("timed out after {}s waiting for {url}", .after.as_secs())]
    Timeout { url: String, after: Duration },

    #[error("no releases found in {repo}")]
    NoReleases { repo: String },

    #[error("no such version: release {tag} does not exist in {repo}")]
    ReleaseNotFound { repo: String, tag: String },

    #[error("no .deb file containing \"{token}\" found in release {tag}")]
    AssetNotFound { tag: String, token: String },

    #[error("no such integration: branch {branch} does not exist in {repo}")]
    IntegrationNotFound { repo: String, branch: String },

    #[error(
        "deploy root not found: no directory under {} contains both {} and {}",
        .searched.display(),
        .build_manifest,
        .compose_manifest
    )]
    DeployRootNotFound {
        searched: PathBuf,
        build_manifest: &'static str,
        compose_manifest: &'static str,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Archive {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("`{command}` exited with {status}")]
    Command { command: String, status: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("license file {}: {reason}", .path.display())]
    License { path: PathBuf, reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { source, .. } if source.is_timeout() => ErrorKind::Cancelled,
            Error::Transport { .. } | Error::Decode { .. } => ErrorKind::UpstreamUnavailable,
            Error::Rejected { .. } | Error::ApiRejected { .. } => ErrorKind::UpstreamRejected,
            Error::Timeout { .. } => ErrorKind::Cancelled,
            Error::NoReleases { .. }
            | Error::ReleaseNotFound { .. }
            | Error::AssetNotFound { .. }
            | Error::IntegrationNotFound { .. }
            | Error::DeployRootNotFound { .. } => ErrorKind::NotFound,
            Error::Io { .. }
            | Error::Archive { .. }
            | Error::Command { .. }
            | Error::Config(_)
            | Error::License { .. } => ErrorKind::LocalIo,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn archive(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        Error::Archive {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Assembly pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ResolveVersion,
    FetchBinary,
    FetchIntegrationArchive,
    Combine,
    Deliver,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::ResolveVersion => "failed to resolve latest version",
            Stage::FetchBinary => "failed to download app",
            Stage::FetchIntegrationArchive => "failed to download integration",
            Stage::Combine => "failed to create combined package",
            Stage::Deliver => "failed to deliver package",
        };
        f.write_str(label)
    }
}

/// A pipeline abort, tagged with the stage that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {source}")]
pub struct AssembleError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl AssembleError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Attach a [`Stage`] to a component failure.
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> Result<T, AssembleError>;
}

impl<T> StageExt<T> for Result<T> {
    fn at(self, stage: Stage) -> Result<T, AssembleError> {
        self.map_err(|source| AssembleError { stage, source })
    }
}
