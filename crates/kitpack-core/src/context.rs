//! Application context for unified dependency injection.

use std::sync::Arc;

use crate::assembler::Assembler;
use crate::config::Settings;
use crate::error::Result;
use crate::fetch::ArtifactFetcher;
use crate::github::GitHubClient;
use crate::remote::ApiClient;
use crate::resolver::{IntegrationResolver, ReleaseResolver};

/// Shared, read-only services built from one [`Settings`] value.
///
/// Frontends create this once and hand out components from it. Cloning is
/// cheap and clones share the HTTP connection pool.
#[derive(Debug, Clone)]
pub struct AppContext {
    settings: Arc<Settings>,
    github: GitHubClient,
}

impl AppContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let github = GitHubClient::new(&settings)?;
        Ok(Self {
            settings: Arc::new(settings),
            github,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn github(&self) -> &GitHubClient {
        &self.github
    }

    pub fn release_resolver(&self) -> Result<ReleaseResolver> {
        let upstream = self.settings.require_upstream()?;
        Ok(ReleaseResolver::new(
            self.github.clone(),
            upstream.product_repo,
            upstream.asset_token,
        ))
    }

    pub fn integration_resolver(&self) -> Result<IntegrationResolver> {
        let upstream = self.settings.require_upstream()?;
        Ok(IntegrationResolver::new(
            self.github.clone(),
            upstream.integrations_repo,
        ))
    }

    pub fn fetcher(&self) -> ArtifactFetcher {
        ArtifactFetcher::new(self.github.clone())
    }

    pub fn assembler(&self) -> Result<Assembler> {
        let upstream = self.settings.require_upstream()?;
        Ok(Assembler::new(
            self.release_resolver()?,
            self.integration_resolver()?,
            self.fetcher(),
            self.settings.product.binary_name.clone(),
            upstream.asset_token,
        ))
    }

    /// Front-door client authenticated with `license_key`.
    pub fn api_client(&self, license_key: impl Into<String>) -> Result<ApiClient> {
        ApiClient::new(&self.settings, license_key)
    }
}
