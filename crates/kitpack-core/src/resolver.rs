//! Release and integration metadata resolution.
//!
//! Every listing performs exactly one upstream call and never retries.
//! The pure selection helpers are public so the ordering and filtering
//! rules can be checked without a network.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::github::{AssetRef, BranchEntry, GitHubClient, ReleaseEntry, ReleaseWithAssets};

/// Version token resolved to the first non-draft release in listing order.
pub const LATEST: &str = "latest";

/// Branch names that are never offered as integrations.
pub const EXCLUDED_BRANCHES: [&str; 2] = ["main", "master"];

const BINARY_SUFFIX: &str = ".deb";

/// Non-draft tags, newest first by lexical comparison.
///
/// The comparison is plain string ordering after stripping one leading `v`,
/// so `v1.9.0` sorts above `v1.10.0`. This is the defined behaviour and is
/// independent of [`latest_release`].
pub fn select_versions(releases: &[ReleaseEntry]) -> Vec<String> {
    let mut versions: Vec<String> = releases
        .iter()
        .filter(|r| !r.is_draft)
        .map(|r| r.tag.clone())
        .collect();
    versions.sort_by(|a, b| compare_tags(b, a));
    versions
}

/// Lexical tag comparison with the version prefix stripped.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    strip_version_prefix(a).cmp(strip_version_prefix(b))
}

fn strip_version_prefix(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// First non-draft release in upstream listing order.
pub fn latest_release(releases: &[ReleaseEntry]) -> Option<&str> {
    releases
        .iter()
        .find(|r| !r.is_draft)
        .map(|r| r.tag.as_str())
}

/// Branch names minus `main`/`master`, sorted ascending.
pub fn select_integrations(branches: &[BranchEntry]) -> Vec<String> {
    let mut names: Vec<String> = branches
        .iter()
        .filter(|b| !EXCLUDED_BRANCHES.contains(&b.name.as_str()))
        .map(|b| b.name.clone())
        .collect();
    names.sort();
    names
}

/// First `.deb` asset whose name contains `token`, in listing order.
pub fn select_binary_asset<'a>(assets: &'a [AssetRef], token: &str) -> Option<&'a AssetRef> {
    assets
        .iter()
        .find(|a| a.name.ends_with(BINARY_SUFFIX) && a.name.contains(token))
}

/// One release listing: display order plus the latest tag, both taken from
/// the same upstream response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    pub versions: Vec<String>,
    pub latest: Option<String>,
}

/// Lists and resolves releases of the product repository.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: GitHubClient,
    repo: String,
    asset_token: String,
}

impl ReleaseResolver {
    pub fn new(
        client: GitHubClient,
        repo: impl Into<String>,
        asset_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            repo: repo.into(),
            asset_token: asset_token.into(),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    async fn releases(&self) -> Result<Vec<ReleaseEntry>> {
        let url = self.client.api_endpoint(&self.repo, "releases");
        self.client.fetch_json(&url).await
    }

    pub async fn versions(&self) -> Result<Vec<String>> {
        tracing::info!(repo = %self.repo, "listing versions");
        let releases = self.releases().await?;
        let versions = select_versions(&releases);
        tracing::debug!(
            fetched = releases.len(),
            kept = versions.len(),
            "filtered draft releases"
        );
        Ok(versions)
    }

    /// Versions and latest tag from a single fetch of the release list.
    pub async fn listing(&self) -> Result<VersionListing> {
        tracing::info!(repo = %self.repo, "listing versions");
        let releases = self.releases().await?;
        Ok(VersionListing {
            versions: select_versions(&releases),
            latest: latest_release(&releases).map(str::to_string),
        })
    }

    pub async fn latest(&self) -> Result<String> {
        let releases = self.releases().await?;
        latest_release(&releases)
            .map(str::to_string)
            .ok_or_else(|| Error::NoReleases {
                repo: self.repo.clone(),
            })
    }

    /// Turn a requested version token into a concrete tag.
    pub async fn resolve(&self, version: &str) -> Result<String> {
        if version != LATEST {
            return Ok(version.to_string());
        }
        let tag = self.latest().await?;
        tracing::info!(%tag, "resolved latest version");
        Ok(tag)
    }

    /// The release's binary asset, selected by suffix and product token.
    pub async fn binary_asset(&self, tag: &str) -> Result<AssetRef> {
        let url = self
            .client
            .api_endpoint(&self.repo, &format!("releases/tags/{tag}"));
        let release: ReleaseWithAssets =
            self.client
                .fetch_json(&url)
                .await
                .map_err(|e| match e {
                    Error::Rejected { status: 404, .. } => Error::ReleaseNotFound {
                        repo: self.repo.clone(),
                        tag: tag.to_string(),
                    },
                    other => other,
                })?;

        select_binary_asset(&release.assets, &self.asset_token)
            .cloned()
            .ok_or_else(|| Error::AssetNotFound {
                tag: tag.to_string(),
                token: self.asset_token.clone(),
            })
    }
}

/// Lists integration branches of the environment repository.
#[derive(Debug, Clone)]
pub struct IntegrationResolver {
    client: GitHubClient,
    repo: String,
}

impl IntegrationResolver {
    pub fn new(client: GitHubClient, repo: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub async fn integrations(&self) -> Result<Vec<String>> {
        tracing::info!(repo = %self.repo, "listing integrations");
        let url = self.client.api_endpoint(&self.repo, "branches");
        let branches: Vec<BranchEntry> = self.client.fetch_json(&url).await?;
        Ok(select_integrations(&branches))
    }

    pub fn archive_url(&self, branch: &str) -> String {
        self.client.branch_archive_url(&self.repo, branch)
    }
}
