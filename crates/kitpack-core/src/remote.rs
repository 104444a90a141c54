//! Installer-side client for the package front door.
//!
//! The front door exposes `GET /versions`, `GET /integrations` and
//! `GET /download/{version}/{integration}`, each guarded by a static
//! license key sent verbatim in the `Authorization` header.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::fetch::{FetchedFile, stream_to_file};
use crate::github::transport;

/// Read a license key from `path`, trimming surrounding whitespace.
pub fn read_license_key(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::License {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let key = content.trim();
    if key.is_empty() {
        return Err(Error::License {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    Ok(key.to_string())
}

/// Listing bodies are accepted either wrapped in an object or bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListingBody {
    Bare(Vec<String>),
    Wrapped(serde_json::Map<String, Value>),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub(crate) fn parse_listing(body: &[u8], key: &str, url: &str) -> Result<Vec<String>> {
    let decode_error = || Error::Decode {
        url: url.to_string(),
        reason: format!(
            "expected a list of {key}, got: {}",
            String::from_utf8_lossy(body)
        ),
    };

    match serde_json::from_slice::<ListingBody>(body).map_err(|_| decode_error())? {
        ListingBody::Bare(items) => Ok(items),
        ListingBody::Wrapped(mut object) => match object.remove(key) {
            Some(value) => serde_json::from_value(value).map_err(|_| decode_error()),
            None => Err(decode_error()),
        },
    }
}

/// Human-readable text from a front-door error body.
pub(crate) fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        Ok(parsed) if !parsed.error.is_empty() => parsed.error,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    license_key: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(settings: &Settings, license_key: impl Into<String>) -> Result<Self> {
        Self::with_base(
            settings.installer.api_url.clone(),
            license_key,
            settings.fetch.timeout(),
        )
    }

    pub fn with_base(base: Url, license_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kitpack/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|source| transport(base.as_str(), source))?;
        Ok(Self {
            http,
            base,
            license_key: license_key.into(),
            timeout,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&self.license_key)
            .map_err(|_| Error::Config("license key contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    pub async fn versions(&self) -> Result<Vec<String>> {
        self.listing("versions").await
    }

    pub async fn integrations(&self) -> Result<Vec<String>> {
        self.listing("integrations").await
    }

    async fn listing(&self, key: &str) -> Result<Vec<String>> {
        let url = self.endpoint(key);
        tracing::debug!(%url, "querying front door");

        let request = async {
            let response = self
                .http
                .get(&url)
                .headers(self.headers()?)
                .send()
                .await
                .map_err(|source| transport(&url, source))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|source| transport(&url, source))?;

            if !status.is_success() {
                return Err(Error::ApiRejected {
                    url: url.clone(),
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }
            parse_listing(&body, key, &url)
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout {
                url: url.clone(),
                after: self.timeout,
            })?
    }

    /// Download the combined package for `version`/`integration` to `dest`.
    pub async fn download_package(
        &self,
        version: &str,
        integration: &str,
        dest: &Path,
    ) -> Result<FetchedFile> {
        let url = self.endpoint(&format!("download/{version}/{integration}"));
        tracing::info!(%url, dest = %dest.display(), "downloading package");

        let transfer = stream_to_file(&self.http, &url, self.headers()?, dest);
        tokio::time::timeout(self.timeout, transfer)
            .await
            .map_err(|_| Error::Timeout {
                url: url.clone(),
                after: self.timeout,
            })?
    }
}

/// Default local file name for a downloaded package.
pub fn default_download_path(asset_token: &str, integration: &str) -> PathBuf {
    PathBuf::from(crate::assembler::package_file_name(asset_token, integration))
}
