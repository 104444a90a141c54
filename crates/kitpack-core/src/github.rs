//! Upstream source-hosting API access.
//!
//! Wire types for the release and branch listings, and [`GitHubClient`],
//! the one place that knows how to talk to the upstream: it adds the bearer
//! and API-version headers, bounds every call by the configured timeout and
//! turns transport/status/decode problems into typed [`Error`]s.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};

/// A release as listed by `GET /repos/{repo}/releases`. Does not contain all fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseEntry {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(rename = "draft", default)]
    pub is_draft: bool,
}

/// A branch as listed by `GET /repos/{repo}/branches`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchEntry {
    pub name: String,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetRef {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// A release fetched by tag, with its assets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseWithAssets {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
}

/// Authenticated, timeout-bounded access to the upstream host.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    web_url: Url,
    token: Option<String>,
    accept: String,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kitpack/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.fetch.timeout())
            .build()
            .map_err(|source| Error::Transport {
                url: settings.github.api_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            api_url: settings.github.api_url.clone(),
            web_url: settings.github.web_url.clone(),
            token: settings.github.token.clone(),
            accept: settings.github.accept.clone(),
            timeout: settings.fetch.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `{api_url}/repos/{repo}/{path}`
    pub fn api_endpoint(&self, repo: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url.as_str().trim_end_matches('/'),
            repo,
            path.trim_start_matches('/')
        )
    }

    /// `{web_url}/{repo}/archive/refs/heads/{branch}.zip`
    pub fn branch_archive_url(&self, repo: &str, branch: &str) -> String {
        format!(
            "{}/{}/archive/refs/heads/{}.zip",
            self.web_url.as_str().trim_end_matches('/'),
            repo,
            branch
        )
    }

    /// Headers sent with every upstream call.
    ///
    /// Downloads only carry the authorization header; API calls also pin
    /// the accept header to the configured API version.
    pub fn auth_headers(&self, api: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("token {token}"))
                .map_err(|_| Error::Config("GitHub token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        if api {
            let value = HeaderValue::from_str(&self.accept)
                .map_err(|_| Error::Config(format!("invalid accept header: {}", self.accept)))?;
            headers.insert(ACCEPT, value);
        }
        Ok(headers)
    }

    /// GET a JSON document from the API, one attempt, bounded by the timeout.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!(url, "fetching upstream metadata");

        let request = async {
            let response = self
                .http
                .get(url)
                .headers(self.auth_headers(true)?)
                .send()
                .await
                .map_err(|source| transport(url, source))?;

            let status = response.status();
            if !status.is_success() {
                return Err(rejected(url, status));
            }

            let body = response
                .bytes()
                .await
                .map_err(|source| transport(url, source))?;
            serde_json::from_slice(&body).map_err(|e| Error::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout {
                url: url.to_string(),
                after: self.timeout,
            })?
    }
}

pub(crate) fn transport(url: &str, source: reqwest::Error) -> Error {
    Error::Transport {
        url: url.to_string(),
        source,
    }
}

pub(crate) fn rejected(url: &str, status: StatusCode) -> Error {
    Error::Rejected {
        url: url.to_string(),
        status: status.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(api: &str, web: &str, token: Option<&str>) -> GitHubClient {
        let mut settings = Settings::default();
        settings.github.api_url = Url::parse(api).unwrap();
        settings.github.web_url = Url::parse(web).unwrap();
        settings.github.token = token.map(str::to_string);
        GitHubClient::new(&settings).unwrap()
    }

    #[test]
    fn api_endpoint_joins_without_double_slashes() {
        let client = client_with("https://api.github.com/", "https://github.com", None);
        assert_eq!(
            client.api_endpoint("acme/widget", "/releases"),
            "https://api.github.com/repos/acme/widget/releases"
        );
    }

    #[test]
    fn api_endpoint_keeps_base_path() {
        let client = client_with(
            "https://ghe.example.test/api/v3",
            "https://ghe.example.test",
            None,
        );
        assert_eq!(
            client.api_endpoint("acme/widget", "branches"),
            "https://ghe.example.test/api/v3/repos/acme/widget/branches"
        );
    }

    #[test]
    fn branch_archive_url_pattern() {
        let client = client_with("https://api.github.com", "https://github.com/", None);
        assert_eq!(
            client.branch_archive_url("acme/envs", "postgres"),
            "https://github.com/acme/envs/archive/refs/heads/postgres.zip"
        );
    }

    #[test]
    fn api_headers_carry_token_and_accept() {
        let client = client_with("https://api.github.com", "https://github.com", Some("s3cret"));
        let headers = client.auth_headers(true).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "token s3cret");
        assert_eq!(
            headers.get(ACCEPT).unwrap(),
            "application/vnd.github.v3+json"
        );
    }

    #[test]
    fn download_headers_skip_accept() {
        let client = client_with("https://api.github.com", "https://github.com", Some("s3cret"));
        let headers = client.auth_headers(false).unwrap();
        assert!(headers.contains_key(AUTHORIZATION));
        assert!(!headers.contains_key(ACCEPT));
    }

    #[test]
    fn release_entry_decodes_api_fields() {
        let releases: Vec<ReleaseEntry> = serde_json::from_str(
            r#"[{"tag_name":"v1.0.0","draft":false,"name":"One"},{"tag_name":"v1.1.0","draft":true}]"#,
        )
        .unwrap();
        assert_eq!(releases[0].tag, "v1.0.0");
        assert!(!releases[0].is_draft);
        assert!(releases[1].is_draft);
    }

    #[test]
    fn release_with_assets_decodes_download_urls() {
        let release: ReleaseWithAssets = serde_json::from_str(
            r#"{"tag_name":"v2.0.0","assets":[{"name":"widget_2.0.0_amd64.deb","browser_download_url":"https://dl/widget.deb","size":1}]}"#,
        )
        .unwrap();
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].download_url, "https://dl/widget.deb");
    }
}
