//! Immutable runtime settings.
//!
//! Built once by a frontend from defaults, an optional `kitpack.toml` and
//! the environment, then handed to every component constructor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "kitpack.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub github: GitHubSettings,
    pub product: ProductSettings,
    pub integrations: IntegrationSettings,
    pub fetch: FetchSettings,
    pub installer: InstallerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSettings {
    pub token: Option<String>,
    pub api_url: Url,
    pub web_url: Url,
    pub accept: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: None,
            api_url: parse_builtin_url("https://api.github.com"),
            web_url: parse_builtin_url("https://github.com"),
            accept: "application/vnd.github.v3+json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProductSettings {
    /// `owner/name` of the repository publishing release binaries.
    pub repo: Option<String>,
    /// Substring a `.deb` asset name must contain. Defaults to the repo name.
    pub asset_token: Option<String>,
    /// Entry name of the binary inside the combined archive.
    pub binary_name: String,
}

impl Default for ProductSettings {
    fn default() -> Self {
        Self {
            repo: None,
            asset_token: None,
            binary_name: "app-selected.deb".to_string(),
        }
    }
}

impl ProductSettings {
    pub fn asset_token(&self) -> Option<&str> {
        self.asset_token.as_deref().or_else(|| {
            self.repo
                .as_deref()
                .and_then(|repo| repo.rsplit('/').next())
                .filter(|name| !name.is_empty())
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationSettings {
    /// `owner/name` of the repository whose branches are integrations.
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerSettings {
    /// Base URL of the package front door.
    pub api_url: Url,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            api_url: parse_builtin_url("http://localhost:1207"),
        }
    }
}

/// Upstream coordinates required by the server-side commands.
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub token: &'a str,
    pub product_repo: &'a str,
    pub asset_token: &'a str,
    pub integrations_repo: &'a str,
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// A missing file yields defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut settings = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("failed to read config file {}", path.display()), e)
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(describe_toml_error(&e, content)))
    }

    /// Overlay environment values on top of file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(repo) = non_empty("KITPACK_PRODUCT_REPO") {
            self.product.repo = Some(repo);
        }
        if let Some(repo) = non_empty("KITPACK_INTEGRATIONS_REPO") {
            self.integrations.repo = Some(repo);
        }
        if let Some(api_url) = non_empty("API_URL") {
            self.installer.api_url = Url::parse(&api_url)
                .map_err(|e| Error::Config(format!("API_URL is not a valid URL: {e}")))?;
        }
        Ok(())
    }

    /// Check everything the assembler and resolvers need is present.
    pub fn require_upstream(&self) -> Result<Upstream<'_>> {
        let token = self
            .github
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("GITHUB_TOKEN is required".to_string()))?;
        let product_repo = self
            .product
            .repo
            .as_deref()
            .ok_or_else(|| Error::Config("product.repo is required".to_string()))?;
        validate_repo(product_repo)?;
        let integrations_repo = self
            .integrations
            .repo
            .as_deref()
            .ok_or_else(|| Error::Config("integrations.repo is required".to_string()))?;
        validate_repo(integrations_repo)?;
        let asset_token = self
            .product
            .asset_token()
            .ok_or_else(|| Error::Config("product.asset_token is empty".to_string()))?;

        Ok(Upstream {
            token,
            product_repo,
            asset_token,
            integrations_repo,
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kitpack").join(CONFIG_FILE_NAME))
}

fn validate_repo(repo: &str) -> Result<()> {
    let mut parts = repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(Error::Config(format!(
            "repository must be in owner/name form: {repo}"
        ))),
    }
}

fn parse_builtin_url(raw: &'static str) -> Url {
    Url::parse(raw).expect("built-in URLs are valid")
}

fn describe_toml_error(error: &toml::de::Error, content: &str) -> String {
    let Some(span) = error.span() else {
        return error.message().to_string();
    };
    let line = content[..span.start.min(content.len())].matches('\n').count() + 1;
    let lines: Vec<&str> = content.lines().collect();
    let start = line.saturating_sub(2);
    let end = (line + 1).min(lines.len());

    let mut context = String::new();
    for (idx, text) in lines[start..end].iter().enumerate() {
        let n = start + idx + 1;
        let marker = if n == line { ">" } else { " " };
        context.push_str(&format!("{marker} {n:4} | {text}\n"));
    }
    format!("line {line}: {}\n{context}", error.message())
}
